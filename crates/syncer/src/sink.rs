use std::sync::Arc;

use sluice_proto::InvocationEnvelope;
use tokio::sync::mpsc;

use crate::error::DispatchError;

/// Outbound half of the engine: hands each invocation to the mesh.
///
/// `send` must not block on the remote function; it only hands the envelope off.
pub trait DispatchSink: Send + Sync + 'static {
	/// Hands one invocation to the transport.
	fn send(&self, invocation: InvocationEnvelope) -> Result<(), DispatchError>;
}

impl<T: DispatchSink + ?Sized> DispatchSink for Arc<T> {
	fn send(&self, invocation: InvocationEnvelope) -> Result<(), DispatchError> {
		(**self).send(invocation)
	}
}

/// Sink that forwards invocations onto an in-process channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
	tx: mpsc::UnboundedSender<InvocationEnvelope>,
}

impl ChannelSink {
	/// Creates a sink plus the receiver a local worker drains.
	pub fn new() -> (Self, mpsc::UnboundedReceiver<InvocationEnvelope>) {
		let (tx, rx) = mpsc::unbounded_channel();
		(Self { tx }, rx)
	}
}

impl DispatchSink for ChannelSink {
	fn send(&self, invocation: InvocationEnvelope) -> Result<(), DispatchError> {
		self.tx.send(invocation).map_err(|_| DispatchError::Closed)
	}
}

#[cfg(test)]
mod tests {
	use sluice_proto::{RequestId, ToolCall, TransactionId};

	use super::*;

	#[test]
	fn channel_sink_reports_closed_receiver() {
		let (sink, rx) = ChannelSink::new();
		let call = ToolCall::function("c1", "f", "{}");
		let env = InvocationEnvelope::new(1, &TransactionId::from("t"), &RequestId::from("r"), &call);

		sink.send(env.clone()).unwrap();
		drop(rx);
		assert!(matches!(sink.send(env), Err(DispatchError::Closed)));
	}
}
