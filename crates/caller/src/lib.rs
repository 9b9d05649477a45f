//! Callers: one correlation engine per credential, wired to the stream mesh.
//!
//! A [`Caller`] owns a [`sluice_syncer::CallSyncer`] whose dispatch sink writes through a
//! mesh [`Source`] and whose result stream is fed by a [`StreamFunction`] observing the
//! reducer tag. It also carries the session state the orchestrator needs: a
//! [`SystemPrompt`] override and the [`Metadata`] exchanged for the credential.
//!
//! [`CallerProvider`] caches callers per credential. [`MemoryMesh`] is an in-process mesh
//! for local wiring and tests.

mod adapter;
mod caller;
mod error;
mod memory;
mod mesh;
mod provider;


pub use adapter::{SourceSink, reducer_handler};
pub use caller::{Caller, Metadata, SystemPrompt, SystemPromptOp};
pub use error::{Error, MeshError, Result};
pub use memory::{FunctionReply, MemoryMesh, MemorySource, MemoryStreamFunction};
pub use mesh::{Frame, FrameHandler, Source, StreamFunction};
pub use provider::{
	CallerProvider, DEFAULT_CACHE_SIZE, MeshConnector, MetadataExchanger, empty_metadata, memory_connector,
};
