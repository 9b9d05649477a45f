use std::path::PathBuf;

use sluice_proto::Tag;

/// A convenient type alias for `Result` with `E` = [`enum@crate::Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures of one orchestrated chat completion.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The caller for the credential could not be obtained.
	#[error(transparent)]
	Caller(#[from] sluice_caller::Error),
	/// The tool-call round failed.
	#[error(transparent)]
	Call(#[from] sluice_syncer::Error),
	/// The LLM provider failed.
	#[error(transparent)]
	Provider(#[from] ProviderError),
	/// Tool registration failed.
	#[error(transparent)]
	Registry(#[from] RegistryError),
	/// The configuration is unusable.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// The request was cancelled while waiting on the provider.
	#[error("chat completion cancelled")]
	Cancelled,
}

/// Failures reported by an [`crate::LlmProvider`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ProviderError {
	/// The request never produced a response.
	#[error("provider request failed: {0}")]
	Request(String),
	/// The provider answered with a non-success status.
	#[error("provider returned status {status}: {body}")]
	Status {
		/// HTTP-like status code.
		status: u16,
		/// Response body.
		body: String,
	},
	/// The response carried no choices.
	#[error("provider returned no choices")]
	EmptyResponse,
}

/// Failures of the tool registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum RegistryError {
	/// Another tag already serves a function with this name.
	#[error("function `{name}` already registered under tag {tag:#x}")]
	DuplicateName {
		/// Function name.
		name: String,
		/// Tag currently holding the name.
		tag: Tag,
	},
}

/// Failures loading or validating [`crate::BridgeConfig`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
	/// The config file could not be read.
	#[error("reading {path}: {source}")]
	Read {
		/// File that failed.
		path: PathBuf,
		/// Underlying error.
		#[source]
		source: std::io::Error,
	},
	/// The config text is not valid TOML for this schema.
	#[error("parsing config: {0}")]
	Parse(#[from] toml::de::Error),
	/// `caller.cache_size` was zero.
	#[error("caller.cache_size must be at least 1")]
	ZeroCacheSize,
	/// `server.provider` names a provider with no `[providers.<name>]` table.
	#[error("provider `{0}` is not configured")]
	UnknownProvider(String),
	/// No provider implementation is available for the selected name.
	#[error("no provider implementation registered for `{0}`")]
	MissingProvider(String),
}
