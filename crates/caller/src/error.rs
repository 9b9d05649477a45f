use sluice_proto::Tag;

/// A convenient type alias for `Result` with `E` = [`enum@crate::Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures of caller construction and teardown.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The mesh connection failed.
	#[error(transparent)]
	Mesh(#[from] MeshError),
	/// The correlation engine failed.
	#[error(transparent)]
	Syncer(#[from] sluice_syncer::Error),
	/// The metadata exchange for a credential failed.
	#[error("metadata exchange for credential failed: {0}")]
	Metadata(String),
}

/// Failures reported by a mesh connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum MeshError {
	/// The connection was closed.
	#[error("mesh connection closed")]
	Closed,
	/// Connecting to the mesh failed.
	#[error("connecting to mesh failed: {0}")]
	Connect(String),
	/// Writing a frame failed.
	#[error("writing frame to tag {tag:#x} failed: {reason}")]
	Write {
		/// Tag the frame was addressed to.
		tag: Tag,
		/// Transport explanation.
		reason: String,
	},
	/// A stream function already has a handler installed.
	#[error("stream function handler already installed")]
	HandlerInstalled,
}
