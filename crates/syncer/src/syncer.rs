use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use sluice_proto::{CompletionResult, InvocationEnvelope, RequestId, TagToolCalls, ToolCallId, TransactionId};
use sluice_worker::{TaskClass, TaskJoin, spawn};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::config::SyncerConfig;
use crate::coordinator::{Command, Coordinator, SyncerStats, Wait};
use crate::error::{Error, Result};
use crate::sink::DispatchSink;
use crate::stream::ResultStream;

/// Correlation engine handle. Cheap to clone; all clones share one coordination task.
#[derive(Clone)]
pub struct CallSyncer {
	inner: Arc<Inner>,
}

struct Inner {
	config: SyncerConfig,
	sink: Arc<dyn DispatchSink>,
	control: mpsc::UnboundedSender<Command>,
	shutdown: CancellationToken,
	generations: AtomicU64,
	join: TaskJoin,
}

impl Drop for Inner {
	fn drop(&mut self) {
		self.shutdown.cancel();
	}
}

impl std::fmt::Debug for CallSyncer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CallSyncer")
			.field("config", &self.inner.config)
			.field("closed", &self.inner.shutdown.is_cancelled())
			.finish_non_exhaustive()
	}
}

/// Sends the cleanup command when a call ends, however it ends.
struct CleanupGuard<'a> {
	control: &'a mpsc::UnboundedSender<Command>,
	request_id: &'a RequestId,
	generation: u64,
}

impl Drop for CleanupGuard<'_> {
	fn drop(&mut self) {
		let _ = self.control.send(Command::Cleanup {
			request_id: self.request_id.clone(),
			generation: self.generation,
		});
	}
}

impl CallSyncer {
	/// Starts the engine over `sink` and `stream`.
	///
	/// The coordination task runs on the ambient tokio runtime, or on the worker
	/// fallback runtime when called outside one.
	pub fn new(config: SyncerConfig, sink: Arc<dyn DispatchSink>, stream: ResultStream) -> Self {
		let (control, control_rx) = mpsc::unbounded_channel();
		let shutdown = CancellationToken::new();
		let coordinator = Coordinator::new(&config);
		let handle = spawn(
			TaskClass::Coordinator,
			coordinator.run(control_rx, stream, shutdown.clone(), config.sweep_interval),
		);
		tracing::debug!(call_timeout = ?config.call_timeout, "syncer.start");

		Self {
			inner: Arc::new(Inner {
				config,
				sink,
				control,
				shutdown,
				generations: AtomicU64::new(0),
				join: TaskJoin::new(handle),
			}),
		}
	}

	/// Config the engine was started with.
	pub fn config(&self) -> &SyncerConfig {
		&self.inner.config
	}

	/// Dispatches every tool call in `calls` and waits for their completions.
	///
	/// Returns exactly one result per dispatched tool call. Calls still outstanding
	/// when the timeout elapses get a [`CompletionResult::timeout`] placeholder.
	/// Results arrive in completion order; treat the vector as a set.
	///
	/// # Errors
	///
	/// - [`Error::Dispatch`] when the sink refuses an invocation. The round is
	///   abandoned and late results of already-dispatched calls are discarded.
	/// - [`Error::Cancelled`] when `cancel` fires first.
	/// - [`Error::Closed`] when the engine is or becomes closed.
	/// - [`Error::DuplicateRequest`] when another call already waits on `request_id`.
	///   Nothing is dispatched in that case.
	pub async fn call(
		&self,
		cancel: &CancellationToken,
		transaction_id: &TransactionId,
		request_id: &RequestId,
		calls: &TagToolCalls,
	) -> Result<Vec<CompletionResult>> {
		let inner = &*self.inner;
		if inner.shutdown.is_cancelled() {
			return Err(Error::Closed);
		}

		let mut outstanding: BTreeMap<ToolCallId, String> = calls
			.values()
			.flatten()
			.map(|call| (call.id.clone(), call.function.name.clone()))
			.collect();
		if outstanding.is_empty() {
			return Ok(Vec::new());
		}

		let generation = inner.generations.fetch_add(1, Ordering::Relaxed) + 1;
		let _cleanup = CleanupGuard {
			control: &inner.control,
			request_id,
			generation,
		};

		// The wait is in place before anything is dispatched, so every answer finds it.
		let (results_tx, mut results_rx) = mpsc::channel(outstanding.len());
		let (accepted_tx, accepted_rx) = oneshot::channel();
		let wait = Wait {
			request_id: request_id.clone(),
			generation,
			remaining: outstanding.keys().cloned().collect(),
			results: results_tx,
		};
		inner
			.control
			.send(Command::Register { wait, accepted: accepted_tx })
			.map_err(|_| Error::Closed)?;
		if !accepted_rx.await.map_err(|_| Error::Closed)? {
			return Err(Error::DuplicateRequest(request_id.clone()));
		}

		self.fire(transaction_id, request_id, calls)?;

		let deadline = tokio::time::sleep(inner.config.call_timeout);
		tokio::pin!(deadline);
		let mut results = Vec::with_capacity(outstanding.len());

		loop {
			tokio::select! {
				biased;
				received = results_rx.recv() => match received {
					Some(completion) => {
						if outstanding.remove(&completion.tool_call_id).is_none() {
							continue;
						}
						results.push(completion.into_result());
						if outstanding.is_empty() {
							tracing::debug!(%request_id, count = results.len(), "syncer.call.complete");
							return Ok(results);
						}
					}
					None => return Err(Error::Closed),
				},
				_ = cancel.cancelled() => {
					tracing::debug!(%request_id, outstanding = outstanding.len(), "syncer.call.cancelled");
					return Err(Error::Cancelled);
				}
				_ = inner.shutdown.cancelled() => return Err(Error::Closed),
				_ = &mut deadline => {
					tracing::warn!(
						%request_id,
						answered = results.len(),
						timed_out = outstanding.len(),
						"syncer.call.timeout"
					);
					results.extend(
						outstanding
							.into_iter()
							.map(|(tool_call_id, function_name)| CompletionResult::timeout(tool_call_id, function_name)),
					);
					return Ok(results);
				}
			}
		}
	}

	/// Hands every invocation to the sink, stopping at the first refusal.
	fn fire(&self, transaction_id: &TransactionId, request_id: &RequestId, calls: &TagToolCalls) -> Result<()> {
		for (&tag, tools) in calls {
			tracing::debug!(tag, count = tools.len(), %transaction_id, %request_id, "syncer.fire");
			for call in tools {
				let invocation = InvocationEnvelope::new(tag, transaction_id, request_id, call);
				if let Err(source) = self.inner.sink.send(invocation) {
					tracing::error!(
						tag,
						%request_id,
						tool_call_id = %call.id,
						error = %source,
						"syncer.fire.failed"
					);
					return Err(Error::Dispatch {
						tool_call_id: call.id.clone(),
						source,
					});
				}
			}
		}
		Ok(())
	}

	/// Snapshot of the coordination state, answered in order with other control commands.
	pub async fn stats(&self) -> Result<SyncerStats> {
		let (tx, rx) = oneshot::channel();
		self.inner.control.send(Command::Stats(tx)).map_err(|_| Error::Closed)?;
		rx.await.map_err(|_| Error::Closed)
	}

	/// Returns true once [`Self::close`] was called.
	pub fn is_closed(&self) -> bool {
		self.inner.shutdown.is_cancelled()
	}

	/// Stops the coordination task and waits for it to exit. Idempotent.
	///
	/// In-flight calls observe [`Error::Closed`].
	pub async fn close(&self) -> Result<()> {
		self.inner.shutdown.cancel();
		let timeout = self.inner.config.close_timeout;
		if self.inner.join.join_with_timeout(timeout).await {
			tracing::debug!("syncer.closed");
			Ok(())
		} else {
			tracing::warn!(?timeout, "syncer.close.timeout");
			Err(Error::CloseTimedOut(timeout))
		}
	}
}
