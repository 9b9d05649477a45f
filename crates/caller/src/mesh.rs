//! Seams towards the stream mesh.
//!
//! A [`Source`] writes tagged frames into the mesh. A [`StreamFunction`] observes tags
//! and gets a callback per inbound frame. Both are shared handles; implementations
//! must tolerate concurrent writes.

use std::sync::Arc;

use bytes::Bytes;
use sluice_proto::Tag;

use crate::error::MeshError;

/// One tagged payload travelling through the mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
	/// Routing key.
	pub tag: Tag,
	/// Opaque payload.
	pub payload: Bytes,
}

/// Callback invoked once per inbound frame. Must not block.
pub type FrameHandler = Arc<dyn Fn(Frame) + Send + Sync>;

/// Write side of the mesh.
pub trait Source: Send + Sync + 'static {
	/// Writes one frame under `tag`.
	fn write(&self, tag: Tag, payload: Bytes) -> Result<(), MeshError>;
	/// Closes the connection. Later writes fail with [`MeshError::Closed`].
	fn close(&self) -> Result<(), MeshError>;
}

/// Observer side of the mesh.
pub trait StreamFunction: Send + Sync + 'static {
	/// Starts observing `tags`, routing every matching frame to `handler`.
	fn connect(&self, tags: &[Tag], handler: FrameHandler) -> Result<(), MeshError>;
	/// Stops observing and closes the connection.
	fn close(&self) -> Result<(), MeshError>;
}
