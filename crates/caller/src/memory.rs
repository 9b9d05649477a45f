//! In-process mesh.
//!
//! Routes frames by tag to registered remote functions and observing stream functions.
//! Remote functions run as spawned tasks and their answers are written back to the
//! reducer tag, the same way a remote worker answers over a real mesh.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::RwLock;
use sluice_proto::{InvocationEnvelope, REDUCER_TAG, Tag, wire};
use sluice_worker::{TaskClass, spawn};

use crate::error::MeshError;
use crate::mesh::{Frame, FrameHandler, Source, StreamFunction};

/// What a remote function answers for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionReply {
	/// Successful result text.
	Ok(String),
	/// Failure explanation, delivered as a result with `is_ok` unset.
	Err(String),
	/// No answer at all.
	Silent,
}

type BoxedReply = Pin<Box<dyn Future<Output = FunctionReply> + Send>>;
type RemoteFn = Arc<dyn Fn(InvocationEnvelope) -> BoxedReply + Send + Sync>;

struct Observer {
	id: u64,
	tags: Vec<Tag>,
	handler: FrameHandler,
}

#[derive(Default)]
struct MeshState {
	functions: RwLock<HashMap<Tag, Vec<RemoteFn>>>,
	observers: RwLock<Vec<Observer>>,
	next_observer: AtomicU64,
}

impl MeshState {
	fn route(self: &Arc<Self>, tag: Tag, payload: Bytes) {
		let functions = self.functions.read().get(&tag).cloned().unwrap_or_default();
		if !functions.is_empty() {
			match wire::decode_invocation(tag, &payload) {
				Ok(invocation) => {
					for function in functions {
						self.run(function, invocation.clone());
					}
				}
				Err(err) => tracing::warn!(tag, error = %err, "mesh.invocation.undecodable"),
			}
		}

		let handlers: Vec<FrameHandler> = self
			.observers
			.read()
			.iter()
			.filter(|o| o.tags.contains(&tag))
			.map(|o| Arc::clone(&o.handler))
			.collect();
		for handler in handlers {
			handler(Frame {
				tag,
				payload: payload.clone(),
			});
		}
	}

	fn run(self: &Arc<Self>, function: RemoteFn, invocation: InvocationEnvelope) {
		let mesh = Arc::clone(self);
		spawn(TaskClass::Remote, async move {
			let completion = match function(invocation.clone()).await {
				FunctionReply::Ok(content) => invocation.complete(content, true),
				FunctionReply::Err(reason) => invocation.complete(reason, false),
				FunctionReply::Silent => return,
			};
			match wire::encode_completion(&invocation, &completion) {
				Ok(payload) => mesh.route(REDUCER_TAG, Bytes::from(payload)),
				Err(err) => tracing::warn!(error = %err, "mesh.completion.unencodable"),
			}
		});
	}
}

/// Shared in-memory mesh. Clones address the same mesh.
#[derive(Clone, Default)]
pub struct MemoryMesh {
	state: Arc<MeshState>,
}

impl std::fmt::Debug for MemoryMesh {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MemoryMesh")
			.field("function_tags", &self.state.functions.read().len())
			.field("observers", &self.state.observers.read().len())
			.finish()
	}
}

impl MemoryMesh {
	/// Creates an empty mesh.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a remote function listening on `tag`.
	///
	/// Several functions may share a tag; each receives every invocation.
	pub fn serve<F, Fut>(&self, tag: Tag, function: F)
	where
		F: Fn(InvocationEnvelope) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = FunctionReply> + Send + 'static,
	{
		let function: RemoteFn = Arc::new(move |invocation: InvocationEnvelope| -> BoxedReply { Box::pin(function(invocation)) });
		self.state.functions.write().entry(tag).or_default().push(function);
	}

	/// Removes every function listening on `tag`.
	pub fn unserve(&self, tag: Tag) {
		self.state.functions.write().remove(&tag);
	}

	/// Opens a new source connection.
	pub fn source(&self) -> MemorySource {
		MemorySource {
			state: Arc::clone(&self.state),
			closed: AtomicBool::new(false),
		}
	}

	/// Opens a new stream function connection.
	pub fn stream_function(&self) -> MemoryStreamFunction {
		MemoryStreamFunction {
			state: Arc::clone(&self.state),
			id: self.state.next_observer.fetch_add(1, Ordering::Relaxed),
			closed: AtomicBool::new(false),
		}
	}
}

/// [`Source`] connection to a [`MemoryMesh`].
pub struct MemorySource {
	state: Arc<MeshState>,
	closed: AtomicBool,
}

impl Source for MemorySource {
	fn write(&self, tag: Tag, payload: Bytes) -> Result<(), MeshError> {
		if self.closed.load(Ordering::Acquire) {
			return Err(MeshError::Closed);
		}
		self.state.route(tag, payload);
		Ok(())
	}

	fn close(&self) -> Result<(), MeshError> {
		self.closed.store(true, Ordering::Release);
		Ok(())
	}
}

/// [`StreamFunction`] connection to a [`MemoryMesh`].
pub struct MemoryStreamFunction {
	state: Arc<MeshState>,
	id: u64,
	closed: AtomicBool,
}

impl StreamFunction for MemoryStreamFunction {
	fn connect(&self, tags: &[Tag], handler: FrameHandler) -> Result<(), MeshError> {
		if self.closed.load(Ordering::Acquire) {
			return Err(MeshError::Closed);
		}
		let mut observers = self.state.observers.write();
		if observers.iter().any(|o| o.id == self.id) {
			return Err(MeshError::HandlerInstalled);
		}
		observers.push(Observer {
			id: self.id,
			tags: tags.to_vec(),
			handler,
		});
		Ok(())
	}

	fn close(&self) -> Result<(), MeshError> {
		self.closed.store(true, Ordering::Release);
		self.state.observers.write().retain(|o| o.id != self.id);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use pretty_assertions::assert_eq;
	use sluice_proto::{RequestId, ToolCall, TransactionId};
	use tokio::sync::mpsc;

	use super::*;

	fn observe(mesh: &MemoryMesh, tag: Tag) -> (MemoryStreamFunction, mpsc::UnboundedReceiver<Frame>) {
		let (tx, rx) = mpsc::unbounded_channel();
		let sfn = mesh.stream_function();
		sfn.connect(
			&[tag],
			Arc::new(move |frame: Frame| {
				let _ = tx.send(frame);
			}),
		)
		.unwrap();
		(sfn, rx)
	}

	fn invocation_frame(tag: Tag) -> Bytes {
		let call = ToolCall::function("c1", "double", "21");
		let inv = InvocationEnvelope::new(tag, &TransactionId::from("t"), &RequestId::from("r"), &call);
		Bytes::from(wire::encode_invocation(&inv).unwrap())
	}

	#[tokio::test]
	async fn function_answers_land_on_reducer_tag() {
		let mesh = MemoryMesh::new();
		mesh.serve(5, |inv| async move {
			let n: u32 = inv.arguments.parse().unwrap_or_default();
			FunctionReply::Ok((n * 2).to_string())
		});
		let (_reducer, mut frames) = observe(&mesh, REDUCER_TAG);

		mesh.source().write(5, invocation_frame(5)).unwrap();

		let frame = tokio::time::timeout(Duration::from_secs(2), frames.recv()).await.unwrap().unwrap();
		assert_eq!(frame.tag, REDUCER_TAG);
		let completion = wire::decode_completion(&frame.payload).unwrap();
		assert_eq!((completion.content.as_str(), completion.is_ok), ("42", true));
	}

	#[tokio::test]
	async fn failures_are_delivered_with_error_marker() {
		let mesh = MemoryMesh::new();
		mesh.serve(5, |_| async { FunctionReply::Err("upstream down".into()) });
		let (_reducer, mut frames) = observe(&mesh, REDUCER_TAG);

		mesh.source().write(5, invocation_frame(5)).unwrap();

		let frame = tokio::time::timeout(Duration::from_secs(2), frames.recv()).await.unwrap().unwrap();
		let completion = wire::decode_completion(&frame.payload).unwrap();
		assert!(!completion.is_ok);
		assert_eq!(completion.content, "upstream down");
	}

	#[test]
	fn closed_connections_reject_use() {
		let mesh = MemoryMesh::new();
		let source = mesh.source();
		source.close().unwrap();
		assert_eq!(source.write(1, Bytes::new()), Err(MeshError::Closed));

		let (sfn, _frames) = observe(&mesh, 1);
		assert_eq!(
			sfn.connect(&[2], Arc::new(|_: Frame| {})),
			Err(MeshError::HandlerInstalled)
		);
		sfn.close().unwrap();
		assert_eq!(sfn.connect(&[2], Arc::new(|_: Frame| {})), Err(MeshError::Closed));
	}

	#[test]
	fn closed_observer_stops_receiving() {
		let mesh = MemoryMesh::new();
		let (sfn, mut frames) = observe(&mesh, 9);
		mesh.source().write(9, Bytes::from_static(b"a")).unwrap();
		sfn.close().unwrap();
		mesh.source().write(9, Bytes::from_static(b"b")).unwrap();

		assert_eq!(frames.try_recv().unwrap().payload, Bytes::from_static(b"a"));
		assert!(frames.try_recv().is_err());
	}
}
