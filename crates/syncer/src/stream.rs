use sluice_proto::{CompletionEnvelope, wire};
use tokio::sync::mpsc;

/// One item observed on the result stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
	/// A decoded completion.
	Completion(CompletionEnvelope),
	/// A frame that could not be decoded. Logged and dropped by the engine.
	Malformed(String),
}

/// Creates the inbound pair: the port the reducer writes into and the stream the engine drains.
pub fn result_channel() -> (ReducerPort, ResultStream) {
	let (tx, rx) = mpsc::unbounded_channel();
	(ReducerPort { tx }, ResultStream { rx })
}

/// Producer side of the result stream, held by the reducer adapter.
///
/// Writes never block, so a reducer callback can always hand completions off.
#[derive(Debug, Clone)]
pub struct ReducerPort {
	tx: mpsc::UnboundedSender<Inbound>,
}

impl ReducerPort {
	/// Pushes a decoded completion. Returns false once the engine stopped listening.
	pub fn complete(&self, completion: CompletionEnvelope) -> bool {
		self.tx.send(Inbound::Completion(completion)).is_ok()
	}

	/// Reports an undecodable frame.
	pub fn malformed(&self, reason: impl Into<String>) -> bool {
		self.tx.send(Inbound::Malformed(reason.into())).is_ok()
	}

	/// Decodes a raw reducer frame and pushes the outcome.
	pub fn on_frame(&self, payload: &[u8]) -> bool {
		match wire::decode_completion(payload) {
			Ok(completion) => {
				tracing::trace!(
					request_id = %completion.request_id,
					tool_call_id = %completion.tool_call_id,
					"syncer.reducer.frame"
				);
				self.complete(completion)
			}
			Err(err) => {
				tracing::debug!(error = %err, len = payload.len(), "syncer.reducer.undecodable");
				self.malformed(err.to_string())
			}
		}
	}

	/// Returns true once the engine dropped the stream.
	pub fn is_closed(&self) -> bool {
		self.tx.is_closed()
	}
}

/// Consumer side of the result stream, owned by the coordination task.
#[derive(Debug)]
pub struct ResultStream {
	rx: mpsc::UnboundedReceiver<Inbound>,
}

impl ResultStream {
	/// Wraps a receiver fed by a custom adapter.
	pub fn from_receiver(rx: mpsc::UnboundedReceiver<Inbound>) -> Self {
		Self { rx }
	}

	/// Next inbound item, or `None` once every port was dropped.
	pub async fn recv(&mut self) -> Option<Inbound> {
		self.rx.recv().await
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use sluice_proto::{InvocationEnvelope, RequestId, ToolCall, TransactionId};

	use super::*;

	#[tokio::test]
	async fn frames_decode_into_completions_or_malformed() {
		let (port, mut stream) = result_channel();
		let call = ToolCall::function("c1", "lookup", "{}");
		let inv = InvocationEnvelope::new(1, &TransactionId::from("t"), &RequestId::from("r"), &call);
		let done = inv.complete("ok", true);

		assert!(port.on_frame(&wire::encode_completion(&inv, &done).unwrap()));
		assert!(port.on_frame(b"{oops"));

		assert_eq!(stream.recv().await, Some(Inbound::Completion(done)));
		assert!(matches!(stream.recv().await, Some(Inbound::Malformed(_))));

		drop(stream);
		assert!(port.is_closed());
		assert!(!port.malformed("late"));
	}
}
