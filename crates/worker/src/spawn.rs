use std::future::Future;
use std::sync::OnceLock;

use tokio::task::JoinHandle;

use crate::TaskClass;

fn runtime_handle() -> tokio::runtime::Handle {
	if let Ok(handle) = tokio::runtime::Handle::try_current() {
		return handle;
	}

	// Mesh callbacks may fire on transport threads that never entered a runtime.
	static FALLBACK_RT: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
	let runtime = FALLBACK_RT.get_or_init(|| {
		tokio::runtime::Builder::new_multi_thread()
			.enable_all()
			.worker_threads(2)
			.thread_name("sluice-worker")
			.build()
			.expect("failed to build sluice fallback tokio runtime")
	});
	runtime.handle().clone()
}

/// Spawns an async task tagged with its execution class.
///
/// Uses the ambient tokio runtime when there is one, otherwise a small shared
/// fallback runtime.
#[allow(clippy::disallowed_methods)]
pub fn spawn<F>(class: TaskClass, fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	tracing::trace!(task_class = class.as_str(), "worker.spawn");
	runtime_handle().spawn(fut)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn spawn_runs_on_ambient_runtime() {
		let handle = spawn(TaskClass::Ingest, async { 7 });
		assert_eq!(handle.await.ok(), Some(7));
	}

	#[test]
	fn spawn_outside_runtime_uses_fallback() {
		let handle = spawn(TaskClass::Teardown, async { "done" });
		let (tx, rx) = std::sync::mpsc::channel();
		let waiter = spawn(TaskClass::Teardown, async move {
			let _ = tx.send(handle.await.ok());
		});
		drop(waiter);
		assert_eq!(rx.recv().ok().flatten(), Some("done"));
	}
}
