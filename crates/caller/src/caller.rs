use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use sluice_proto::{CompletionResult, REDUCER_TAG, RequestId, TagToolCalls, TransactionId};
use sluice_syncer::{CallSyncer, SyncerConfig, result_channel};
use tokio_util::sync::CancellationToken;

use crate::adapter::{SourceSink, reducer_handler};
use crate::error::{Error, Result};
use crate::mesh::{Source, StreamFunction};

/// How a caller's system prompt is combined with the client's messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SystemPromptOp {
	/// Replace the client's system message. An empty prompt leaves messages untouched.
	#[default]
	Overwrite,
	/// Never touch the client's messages.
	Disabled,
	/// Put the prompt in front of the client's system message.
	Prefix,
	/// Keep the client's system message when it has one.
	ClientPreferred,
}

/// System prompt override of one caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemPrompt {
	/// Prompt text.
	pub text: String,
	/// Combination policy.
	pub op: SystemPromptOp,
}

/// String key/value pairs obtained for a credential when its caller is created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
	/// Empty metadata.
	pub fn new() -> Self {
		Self::default()
	}

	/// Value stored under `key`.
	pub fn get(&self, key: &str) -> Option<&str> {
		self.0.get(key).map(String::as_str)
	}

	/// Stores `value` under `key`, returning the previous value.
	pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
		self.0.insert(key.into(), value.into())
	}

	/// Iterates entries in key order.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
	}

	/// Number of entries.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns true when no entries are stored.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
	}
}

/// Session object of one credential: a correlation engine wired to the mesh,
/// plus the system prompt and metadata the orchestrator applies to its requests.
pub struct Caller {
	credential: String,
	syncer: CallSyncer,
	source: Arc<dyn Source>,
	reducer: Arc<dyn StreamFunction>,
	prompt: ArcSwap<SystemPrompt>,
	metadata: Metadata,
}

impl std::fmt::Debug for Caller {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Caller")
			.field("syncer", &self.syncer)
			.field("prompt", &self.prompt.load())
			.field("metadata", &self.metadata)
			.finish_non_exhaustive()
	}
}

impl Caller {
	/// Wires a new engine between `source` and `reducer`.
	///
	/// The reducer is connected to the reducer tag before the engine accepts calls.
	/// On failure both mesh handles are closed.
	pub fn new(
		credential: impl Into<String>,
		source: Arc<dyn Source>,
		reducer: Arc<dyn StreamFunction>,
		metadata: Metadata,
		config: SyncerConfig,
	) -> Result<Self> {
		let credential = credential.into();
		let (port, stream) = result_channel();
		if let Err(err) = reducer.connect(&[REDUCER_TAG], reducer_handler(port)) {
			tracing::warn!(error = %err, "caller.reducer.connect_failed");
			close_quietly("source", source.close());
			close_quietly("reducer", reducer.close());
			return Err(err.into());
		}

		let syncer = CallSyncer::new(config, Arc::new(SourceSink::new(Arc::clone(&source))), stream);
		tracing::debug!(entries = metadata.len(), "caller.created");
		Ok(Self {
			credential,
			syncer,
			source,
			reducer,
			prompt: ArcSwap::from_pointee(SystemPrompt::default()),
			metadata,
		})
	}

	/// Credential this caller was created for.
	pub fn credential(&self) -> &str {
		&self.credential
	}

	/// Replaces the system prompt override.
	pub fn set_system_prompt(&self, text: impl Into<String>, op: SystemPromptOp) {
		self.prompt.store(Arc::new(SystemPrompt { text: text.into(), op }));
	}

	/// Current system prompt override.
	pub fn system_prompt(&self) -> Arc<SystemPrompt> {
		self.prompt.load_full()
	}

	/// Metadata exchanged when the caller was created.
	pub fn metadata(&self) -> &Metadata {
		&self.metadata
	}

	/// Dispatches one round of tool calls; see [`CallSyncer::call`].
	pub async fn call(
		&self,
		cancel: &CancellationToken,
		transaction_id: &TransactionId,
		request_id: &RequestId,
		calls: &TagToolCalls,
	) -> sluice_syncer::Result<Vec<CompletionResult>> {
		self.syncer.call(cancel, transaction_id, request_id, calls).await
	}

	/// Returns true once the caller was closed.
	pub fn is_closed(&self) -> bool {
		self.syncer.is_closed()
	}

	/// Closes the engine, the source and the reducer.
	///
	/// Every step is attempted; failures are logged and the first one is returned.
	pub async fn close(&self) -> Result<()> {
		let mut first: Option<Error> = None;
		if let Err(err) = self.syncer.close().await {
			tracing::warn!(error = %err, "caller.close.syncer");
			first.get_or_insert(err.into());
		}
		if let Err(err) = self.source.close() {
			tracing::warn!(error = %err, "caller.close.source");
			first.get_or_insert(err.into());
		}
		if let Err(err) = self.reducer.close() {
			tracing::warn!(error = %err, "caller.close.reducer");
			first.get_or_insert(err.into());
		}
		match first {
			Some(err) => Err(err),
			None => Ok(()),
		}
	}
}

fn close_quietly(what: &'static str, res: std::result::Result<(), crate::MeshError>) {
	if let Err(err) = res {
		tracing::warn!(what, error = %err, "caller.teardown.failed");
	}
}
