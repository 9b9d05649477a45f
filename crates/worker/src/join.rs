use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

enum Slot {
	/// Task handle still owned; the first joiner takes it.
	Owned(JoinHandle<()>),
	/// One joiner is awaiting the handle; the rest wait on the notify.
	Joining,
	/// Task has finished and was observed.
	Finished,
}

enum Step {
	Done,
	Wait,
	Lead(JoinHandle<()>),
}

/// Idempotent join control for one long-lived task.
///
/// Any number of callers may join concurrently: exactly one of them awaits the
/// underlying [`JoinHandle`], the others wait until it reports completion. A timed
/// join that gives up hands the handle back so a later join can still finish it.
pub struct TaskJoin {
	slot: Mutex<Slot>,
	finished: Notify,
}

impl std::fmt::Debug for TaskJoin {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TaskJoin").finish_non_exhaustive()
	}
}

impl TaskJoin {
	/// Wraps a spawned task.
	pub fn new(handle: JoinHandle<()>) -> Self {
		Self {
			slot: Mutex::new(Slot::Owned(handle)),
			finished: Notify::new(),
		}
	}

	/// Returns true once some joiner observed the task finishing.
	pub async fn is_finished(&self) -> bool {
		matches!(*self.slot.lock().await, Slot::Finished)
	}

	/// Waits until the task has finished. Safe to call from many tasks at once.
	pub async fn join(&self) {
		loop {
			let notified = self.finished.notified();
			tokio::pin!(notified);
			// Enable before inspecting the slot so a leader finishing in between is not missed.
			notified.as_mut().enable();
			match self.step().await {
				Step::Done => return,
				Step::Wait => notified.await,
				Step::Lead(handle) => {
					if let Err(err) = handle.await {
						tracing::debug!(error = %err, "worker.join.task_failed");
					}
					self.finish().await;
					return;
				}
			}
		}
	}

	/// Waits until the task has finished or `timeout` elapses.
	///
	/// Returns `true` when the task finished within the deadline.
	pub async fn join_with_timeout(&self, timeout: Duration) -> bool {
		let deadline = tokio::time::Instant::now() + timeout;
		loop {
			let notified = self.finished.notified();
			tokio::pin!(notified);
			notified.as_mut().enable();
			match self.step().await {
				Step::Done => return true,
				Step::Wait => {
					tokio::select! {
						_ = notified => continue,
						_ = tokio::time::sleep_until(deadline) => return false,
					}
				}
				Step::Lead(mut handle) => {
					tokio::select! {
						res = &mut handle => {
							if let Err(err) = res {
								tracing::debug!(error = %err, "worker.join.task_failed");
							}
							self.finish().await;
							return true;
						}
						_ = tokio::time::sleep_until(deadline) => {
							*self.slot.lock().await = Slot::Owned(handle);
							// Wake followers so one of them can take over the handle.
							self.finished.notify_waiters();
							return false;
						}
					}
				}
			}
		}
	}

	async fn step(&self) -> Step {
		let mut slot = self.slot.lock().await;
		match std::mem::replace(&mut *slot, Slot::Joining) {
			Slot::Finished => {
				*slot = Slot::Finished;
				Step::Done
			}
			Slot::Joining => Step::Wait,
			Slot::Owned(handle) => Step::Lead(handle),
		}
	}

	async fn finish(&self) {
		*self.slot.lock().await = Slot::Finished;
		self.finished.notify_waiters();
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use tokio::sync::oneshot;

	use super::*;
	use crate::{TaskClass, spawn};

	#[tokio::test]
	async fn concurrent_joiners_all_return() {
		let (release_tx, release_rx) = oneshot::channel::<()>();
		let join = Arc::new(TaskJoin::new(spawn(TaskClass::Coordinator, async move {
			let _ = release_rx.await;
		})));

		let a = spawn(TaskClass::Teardown, {
			let join = Arc::clone(&join);
			async move { join.join().await }
		});
		let b = spawn(TaskClass::Teardown, {
			let join = Arc::clone(&join);
			async move { join.join().await }
		});
		tokio::task::yield_now().await;
		assert!(!join.is_finished().await);

		let _ = release_tx.send(());
		assert!(tokio::time::timeout(Duration::from_secs(2), a).await.is_ok());
		assert!(tokio::time::timeout(Duration::from_secs(2), b).await.is_ok());
		assert!(join.is_finished().await);
	}

	#[tokio::test]
	async fn join_after_finish_is_immediate() {
		let join = TaskJoin::new(spawn(TaskClass::Coordinator, async {}));
		join.join().await;
		join.join().await;
		assert!(join.is_finished().await);
	}

	#[tokio::test]
	async fn timed_out_join_returns_handle_for_followup() {
		let (release_tx, release_rx) = oneshot::channel::<()>();
		let join = TaskJoin::new(spawn(TaskClass::Coordinator, async move {
			let _ = release_rx.await;
		}));

		assert!(!join.join_with_timeout(Duration::from_millis(10)).await);
		assert!(!join.is_finished().await);

		let _ = release_tx.send(());
		assert!(join.join_with_timeout(Duration::from_secs(2)).await);
		assert!(join.is_finished().await);
	}

	#[tokio::test]
	async fn panicking_task_still_counts_as_finished() {
		let join = TaskJoin::new(spawn(TaskClass::Remote, async { panic!("handler blew up") }));
		assert!(join.join_with_timeout(Duration::from_secs(2)).await);
	}
}
