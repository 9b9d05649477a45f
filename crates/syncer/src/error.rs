use std::time::Duration;

use sluice_proto::{RequestId, ToolCallId, WireError};

/// A convenient type alias for `Result` with `E` = [`enum@crate::Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures surfaced by [`crate::CallSyncer`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The dispatch sink refused one invocation; the round was aborted before waiting.
	#[error("dispatching tool call {tool_call_id} failed: {source}")]
	Dispatch {
		/// First invocation the sink refused.
		tool_call_id: ToolCallId,
		/// Reason reported by the sink.
		#[source]
		source: DispatchError,
	},
	/// The engine was closed before the call produced its results.
	#[error("call syncer closed")]
	Closed,
	/// The caller cancelled the call before it produced its results.
	#[error("call cancelled by caller")]
	Cancelled,
	/// Another call is already waiting on the same request id.
	#[error("request {0} already has an outstanding wait")]
	DuplicateRequest(RequestId),
	/// The coordination task did not stop within the configured close timeout.
	#[error("coordination task did not stop within {0:?}")]
	CloseTimedOut(Duration),
}

/// Failure reported by a [`crate::DispatchSink`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DispatchError {
	/// The underlying connection is closed.
	#[error("dispatch sink closed")]
	Closed,
	/// The invocation could not be encoded for the wire.
	#[error("encoding invocation: {0}")]
	Encode(#[from] WireError),
	/// The transport rejected the write.
	#[error("transport rejected write: {0}")]
	Transport(String),
}
