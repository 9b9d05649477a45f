use std::sync::Arc;

use bytes::Bytes;
use sluice_proto::{InvocationEnvelope, REDUCER_TAG, wire};
use sluice_syncer::{DispatchError, DispatchSink, ReducerPort};

use crate::error::MeshError;
use crate::mesh::{Frame, FrameHandler, Source};

/// Dispatch sink writing encoded invocations through a mesh [`Source`].
pub struct SourceSink {
	source: Arc<dyn Source>,
}

impl SourceSink {
	/// Wraps `source`.
	pub fn new(source: Arc<dyn Source>) -> Self {
		Self { source }
	}
}

impl DispatchSink for SourceSink {
	fn send(&self, invocation: InvocationEnvelope) -> Result<(), DispatchError> {
		let payload = wire::encode_invocation(&invocation)?;
		tracing::trace!(
			tag = invocation.tag,
			request_id = %invocation.request_id,
			tool_call_id = %invocation.tool_call_id,
			"caller.source.write"
		);
		self.source
			.write(invocation.tag, Bytes::from(payload))
			.map_err(|err| match err {
				MeshError::Closed => DispatchError::Closed,
				other => DispatchError::Transport(other.to_string()),
			})
	}
}

/// Builds the reducer callback feeding `port`.
///
/// Frames on any tag other than the reducer tag are ignored.
pub fn reducer_handler(port: ReducerPort) -> FrameHandler {
	Arc::new(move |frame: Frame| {
		if frame.tag != REDUCER_TAG {
			tracing::debug!(tag = frame.tag, "caller.reducer.foreign_tag");
			return;
		}
		if !port.on_frame(&frame.payload) {
			tracing::debug!("caller.reducer.engine_gone");
		}
	})
}

#[cfg(test)]
mod tests {
	use parking_lot::Mutex;
	use pretty_assertions::assert_eq;
	use sluice_proto::{RequestId, ToolCall, TransactionId};
	use sluice_syncer::{Inbound, result_channel};

	use super::*;

	#[derive(Default)]
	struct Recorder {
		frames: Mutex<Vec<Frame>>,
		closed: Mutex<bool>,
	}

	impl Source for Recorder {
		fn write(&self, tag: sluice_proto::Tag, payload: Bytes) -> Result<(), MeshError> {
			if *self.closed.lock() {
				return Err(MeshError::Closed);
			}
			self.frames.lock().push(Frame { tag, payload });
			Ok(())
		}

		fn close(&self) -> Result<(), MeshError> {
			*self.closed.lock() = true;
			Ok(())
		}
	}

	fn invocation() -> InvocationEnvelope {
		let call = ToolCall::function("c1", "weather", r#"{"city":"Lima"}"#);
		InvocationEnvelope::new(0x21, &TransactionId::from("t"), &RequestId::from("r"), &call)
	}

	#[test]
	fn source_sink_writes_encoded_frame_under_invocation_tag() {
		let recorder = Arc::new(Recorder::default());
		let sink = SourceSink::new(recorder.clone());

		sink.send(invocation()).unwrap();
		let frames = recorder.frames.lock();
		assert_eq!(frames.len(), 1);
		assert_eq!(frames[0].tag, 0x21);
		assert_eq!(wire::decode_invocation(0x21, &frames[0].payload).unwrap(), invocation());
	}

	#[test]
	fn closed_source_maps_to_closed_dispatch() {
		let recorder = Arc::new(Recorder::default());
		let sink = SourceSink::new(recorder.clone());
		recorder.close().unwrap();
		assert!(matches!(sink.send(invocation()), Err(DispatchError::Closed)));
	}

	#[tokio::test]
	async fn reducer_handler_only_decodes_reducer_frames() {
		let (port, mut stream) = result_channel();
		let handler = reducer_handler(port);
		let inv = invocation();
		let done = inv.complete("sunny", true);
		let payload = Bytes::from(wire::encode_completion(&inv, &done).unwrap());

		handler(Frame {
			tag: 0x21,
			payload: payload.clone(),
		});
		handler(Frame {
			tag: REDUCER_TAG,
			payload,
		});

		assert_eq!(stream.recv().await, Some(Inbound::Completion(done)));
	}
}
