use std::collections::{HashMap, HashSet};
use std::time::Duration;

use lru::LruCache;
use sluice_proto::{CompletionEnvelope, RequestId, ToolCallId};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::SyncerConfig;
use crate::stream::{Inbound, ResultStream};

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Messages on the ordered control queue.
pub(crate) enum Command {
	/// `accepted` answers false when another call holds the request id.
	Register { wait: Wait, accepted: oneshot::Sender<bool> },
	Cleanup { request_id: RequestId, generation: u64 },
	Stats(oneshot::Sender<SyncerStats>),
}

/// Registration of one in-flight call.
pub(crate) struct Wait {
	pub request_id: RequestId,
	/// Distinguishes calls that reuse a request id.
	pub generation: u64,
	pub remaining: HashSet<ToolCallId>,
	/// Sized to the initial `remaining` count, so delivery never sees a full buffer.
	pub results: mpsc::Sender<CompletionEnvelope>,
}

impl Wait {
	fn deliver(&mut self, completion: CompletionEnvelope) {
		if !self.remaining.remove(&completion.tool_call_id) {
			tracing::trace!(
				request_id = %self.request_id,
				tool_call_id = %completion.tool_call_id,
				"syncer.completion.duplicate"
			);
			return;
		}
		if let Err(err) = self.results.try_send(completion) {
			tracing::debug!(request_id = %self.request_id, error = %err, "syncer.completion.undeliverable");
		}
	}
}

/// Completions that arrived before their call registered.
struct Orphans {
	first_seen: Instant,
	completions: HashMap<ToolCallId, CompletionEnvelope>,
}

/// Point-in-time view of the coordination state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncerStats {
	/// Calls currently registered.
	pub pending_waits: usize,
	/// Request ids holding buffered completions.
	pub buffered_requests: usize,
	/// Buffered completions across all request ids.
	pub buffered_completions: usize,
	/// Request ids remembered as finished.
	pub retired_requests: usize,
}

/// State owned by the coordination task. Nothing else touches it.
pub(crate) struct Coordinator {
	waits: HashMap<RequestId, Wait>,
	orphans: HashMap<RequestId, Orphans>,
	retired: LruCache<RequestId, ()>,
	orphan_ttl: Duration,
}

impl Coordinator {
	pub(crate) fn new(config: &SyncerConfig) -> Self {
		Self {
			waits: HashMap::new(),
			orphans: HashMap::new(),
			retired: LruCache::new(config.retired_capacity),
			orphan_ttl: config.orphan_ttl,
		}
	}

	pub(crate) async fn run(
		mut self,
		mut control: mpsc::UnboundedReceiver<Command>,
		mut stream: ResultStream,
		shutdown: CancellationToken,
		sweep_interval: Duration,
	) {
		let mut sweep = tokio::time::interval(sweep_interval.max(MIN_SWEEP_INTERVAL));
		sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
		let mut stream_open = true;

		tracing::debug!("syncer.coordinator.start");
		loop {
			tokio::select! {
				biased;
				_ = shutdown.cancelled() => break,
				cmd = control.recv() => match cmd {
					Some(cmd) => self.on_command(cmd),
					None => break,
				},
				inbound = stream.recv(), if stream_open => match inbound {
					Some(inbound) => self.on_inbound(inbound, Instant::now()),
					None => {
						tracing::warn!("syncer.result_stream.closed");
						stream_open = false;
					}
				},
				_ = sweep.tick() => self.sweep(Instant::now()),
			}
		}
		tracing::debug!(
			pending_waits = self.waits.len(),
			buffered_requests = self.orphans.len(),
			"syncer.coordinator.exit"
		);
	}

	pub(crate) fn on_command(&mut self, cmd: Command) {
		match cmd {
			Command::Register { wait, accepted } => {
				let _ = accepted.send(self.register(wait));
			}
			Command::Cleanup { request_id, generation } => self.cleanup(request_id, generation),
			Command::Stats(reply) => {
				let _ = reply.send(self.stats());
			}
		}
	}

	fn register(&mut self, mut wait: Wait) -> bool {
		if self.waits.contains_key(&wait.request_id) {
			tracing::warn!(request_id = %wait.request_id, "syncer.wait.duplicate_request");
			return false;
		}
		self.retired.pop(&wait.request_id);

		if let Some(orphans) = self.orphans.remove(&wait.request_id) {
			tracing::debug!(
				request_id = %wait.request_id,
				buffered = orphans.completions.len(),
				"syncer.wait.drain_buffer"
			);
			for (_, completion) in orphans.completions {
				wait.deliver(completion);
			}
		}

		tracing::trace!(request_id = %wait.request_id, expected = wait.remaining.len(), "syncer.wait.register");
		self.waits.insert(wait.request_id.clone(), wait);
		true
	}

	fn cleanup(&mut self, request_id: RequestId, generation: u64) {
		match self.waits.get(&request_id) {
			Some(wait) if wait.generation != generation => {
				// Another call owns this request id now; leave it alone.
				return;
			}
			Some(_) => {
				self.waits.remove(&request_id);
			}
			None => {}
		}
		if let Some(orphans) = self.orphans.remove(&request_id) {
			tracing::trace!(%request_id, dropped = orphans.completions.len(), "syncer.cleanup.buffer");
		}
		tracing::trace!(%request_id, "syncer.wait.retire");
		self.retired.put(request_id, ());
	}

	pub(crate) fn on_inbound(&mut self, inbound: Inbound, now: Instant) {
		let completion = match inbound {
			Inbound::Malformed(reason) => {
				tracing::warn!(%reason, "syncer.completion.malformed");
				return;
			}
			Inbound::Completion(completion) if completion.request_id.is_empty() => {
				tracing::warn!(tool_call_id = %completion.tool_call_id, "syncer.completion.no_request_id");
				return;
			}
			Inbound::Completion(completion) => completion,
		};

		if let Some(wait) = self.waits.get_mut(&completion.request_id) {
			wait.deliver(completion);
			return;
		}
		if self.retired.contains(&completion.request_id) {
			tracing::debug!(
				request_id = %completion.request_id,
				tool_call_id = %completion.tool_call_id,
				"syncer.completion.late"
			);
			return;
		}

		let orphans = self.orphans.entry(completion.request_id.clone()).or_insert_with(|| Orphans {
			first_seen: now,
			completions: HashMap::new(),
		});
		orphans.completions.entry(completion.tool_call_id.clone()).or_insert(completion);
	}

	pub(crate) fn sweep(&mut self, now: Instant) {
		let ttl = self.orphan_ttl;
		let before = self.orphans.len();
		self.orphans.retain(|_, orphans| now.saturating_duration_since(orphans.first_seen) < ttl);
		let expired = before - self.orphans.len();
		if expired > 0 {
			tracing::debug!(expired, "syncer.buffer.sweep");
		}
	}

	pub(crate) fn stats(&self) -> SyncerStats {
		SyncerStats {
			pending_waits: self.waits.len(),
			buffered_requests: self.orphans.len(),
			buffered_completions: self.orphans.values().map(|o| o.completions.len()).sum(),
			retired_requests: self.retired.len(),
		}
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use sluice_proto::{InvocationEnvelope, ToolCall, TransactionId};

	use super::*;

	fn completion(request: &str, call: &str) -> CompletionEnvelope {
		let call = ToolCall::function(call, "f", "{}");
		InvocationEnvelope::new(1, &TransactionId::from("t"), &RequestId::from(request), &call).complete("done", true)
	}

	fn wait(request: &str, generation: u64, calls: &[&str]) -> (Wait, mpsc::Receiver<CompletionEnvelope>) {
		let (tx, rx) = mpsc::channel(calls.len().max(1));
		let wait = Wait {
			request_id: RequestId::from(request),
			generation,
			remaining: calls.iter().map(|c| ToolCallId::from(*c)).collect(),
			results: tx,
		};
		(wait, rx)
	}

	fn register(coord: &mut Coordinator, wait: Wait) -> bool {
		let (accepted, mut rx) = oneshot::channel();
		coord.on_command(Command::Register { wait, accepted });
		rx.try_recv().unwrap()
	}

	#[test]
	fn buffered_completions_drain_on_register() {
		let mut coord = Coordinator::new(&SyncerConfig::default());
		let now = Instant::now();
		coord.on_inbound(Inbound::Completion(completion("r1", "a")), now);
		coord.on_inbound(Inbound::Completion(completion("r1", "stray")), now);
		assert_eq!(coord.stats().buffered_completions, 2);

		let (w, mut rx) = wait("r1", 1, &["a", "b"]);
		assert!(register(&mut coord, w));

		assert_eq!(rx.try_recv().unwrap().tool_call_id.as_str(), "a");
		assert!(rx.try_recv().is_err());
		assert_eq!(
			coord.stats(),
			SyncerStats {
				pending_waits: 1,
				..SyncerStats::default()
			}
		);
	}

	#[test]
	fn duplicate_completions_are_forwarded_once() {
		let mut coord = Coordinator::new(&SyncerConfig::default());
		let (w, mut rx) = wait("r1", 1, &["a"]);
		assert!(register(&mut coord, w));

		coord.on_inbound(Inbound::Completion(completion("r1", "a")), Instant::now());
		coord.on_inbound(Inbound::Completion(completion("r1", "a")), Instant::now());

		assert!(rx.try_recv().is_ok());
		assert!(rx.try_recv().is_err());
	}

	#[test]
	fn cleanup_retires_request_and_drops_late_completions() {
		let mut coord = Coordinator::new(&SyncerConfig::default());
		let (w, _rx) = wait("r1", 7, &["a"]);
		assert!(register(&mut coord, w));
		coord.on_command(Command::Cleanup {
			request_id: RequestId::from("r1"),
			generation: 7,
		});

		coord.on_inbound(Inbound::Completion(completion("r1", "a")), Instant::now());
		assert_eq!(
			coord.stats(),
			SyncerStats {
				retired_requests: 1,
				..SyncerStats::default()
			}
		);
	}

	#[test]
	fn stale_cleanup_leaves_newer_wait_alone() {
		let mut coord = Coordinator::new(&SyncerConfig::default());
		let (w, _rx) = wait("r1", 2, &["a"]);
		assert!(register(&mut coord, w));
		coord.on_command(Command::Cleanup {
			request_id: RequestId::from("r1"),
			generation: 1,
		});
		assert_eq!(coord.stats().pending_waits, 1);
	}

	#[test]
	fn duplicate_registration_is_refused() {
		let mut coord = Coordinator::new(&SyncerConfig::default());
		let (first, _first_rx) = wait("r1", 1, &["a"]);
		let (second, mut second_rx) = wait("r1", 2, &["a"]);
		assert!(register(&mut coord, first));
		assert!(!register(&mut coord, second));

		assert!(matches!(second_rx.try_recv(), Err(mpsc::error::TryRecvError::Disconnected)));
		assert_eq!(coord.stats().pending_waits, 1);
	}

	#[test]
	fn sweep_expires_old_orphans_only() {
		let mut coord = Coordinator::new(&SyncerConfig::default().orphan_ttl(Duration::from_secs(10)));
		let start = Instant::now();
		coord.on_inbound(Inbound::Completion(completion("old", "a")), start);
		coord.on_inbound(Inbound::Completion(completion("new", "a")), start + Duration::from_secs(8));

		coord.sweep(start + Duration::from_secs(11));
		assert_eq!(coord.stats().buffered_requests, 1);
		coord.sweep(start + Duration::from_secs(19));
		assert_eq!(coord.stats().buffered_requests, 0);
	}

	#[test]
	fn malformed_input_changes_nothing() {
		let mut coord = Coordinator::new(&SyncerConfig::default());
		coord.on_inbound(Inbound::Malformed("bad json".into()), Instant::now());
		coord.on_inbound(Inbound::Completion(completion("", "a")), Instant::now());
		assert_eq!(coord.stats(), SyncerStats::default());
	}
}
