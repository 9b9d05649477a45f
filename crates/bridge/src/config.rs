use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sluice_syncer::SyncerConfig;

use crate::error::ConfigError;

/// Bridge configuration, read from TOML.
///
/// ```toml
/// [server]
/// addr = "localhost:8000"
/// provider = "openai"
///
/// [mesh]
/// zipper = "localhost:9000"
/// credential = "token:secret"
///
/// [caller]
/// call_timeout_secs = 60
/// cache_size = 1024
///
/// [providers.openai]
/// api_key = "sk-..."
/// model = "gpt-4o"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
	/// Listener and provider selection.
	pub server: ServerConfig,
	/// Mesh connection.
	pub mesh: MeshConfig,
	/// Caller tuning.
	pub caller: CallerConfig,
	/// Free-form settings per provider name.
	pub providers: BTreeMap<String, BTreeMap<String, String>>,
}

/// `[server]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
	/// Address the bridge listens on.
	pub addr: String,
	/// Selected provider; empty picks the first available one.
	pub provider: String,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self {
			addr: "localhost:8000".to_owned(),
			provider: String::new(),
		}
	}
}

/// `[mesh]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MeshConfig {
	/// Zipper address.
	pub zipper: String,
	/// Credential used when the client supplies none.
	pub credential: String,
}

impl Default for MeshConfig {
	fn default() -> Self {
		Self {
			zipper: "localhost:9000".to_owned(),
			credential: String::new(),
		}
	}
}

/// `[caller]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CallerConfig {
	/// Seconds a tool-call round waits before degrading to timeout placeholders.
	pub call_timeout_secs: u64,
	/// Callers kept alive at once.
	pub cache_size: usize,
}

impl Default for CallerConfig {
	fn default() -> Self {
		Self {
			call_timeout_secs: 60,
			cache_size: 1024,
		}
	}
}

impl BridgeConfig {
	/// Parses and validates TOML text.
	pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(text)?;
		config.validate()?;
		Ok(config)
	}

	/// Reads, parses and validates a TOML file.
	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		let config = Self::from_toml_str(&text)?;
		tracing::debug!(path = %path.display(), provider = %config.server.provider, "bridge.config.loaded");
		Ok(config)
	}

	/// Checks cross-field constraints.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.caller.cache_size == 0 {
			return Err(ConfigError::ZeroCacheSize);
		}
		let selected = &self.server.provider;
		if !selected.is_empty() && !self.providers.contains_key(selected) {
			return Err(ConfigError::UnknownProvider(selected.clone()));
		}
		Ok(())
	}

	/// Engine settings derived from the `[caller]` section.
	pub fn syncer_config(&self) -> SyncerConfig {
		SyncerConfig::default().call_timeout(Duration::from_secs(self.caller.call_timeout_secs))
	}

	/// Caller cache capacity.
	pub fn cache_size(&self) -> Result<NonZeroUsize, ConfigError> {
		NonZeroUsize::new(self.caller.cache_size).ok_or(ConfigError::ZeroCacheSize)
	}

	/// Settings of the provider named `name`.
	pub fn provider_settings(&self, name: &str) -> Option<&BTreeMap<String, String>> {
		self.providers.get(name)
	}
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn empty_text_yields_defaults() {
		let config = BridgeConfig::from_toml_str("").unwrap();
		assert_eq!(config, BridgeConfig::default());
		assert_eq!(config.syncer_config().call_timeout, Duration::from_secs(60));
		assert_eq!(config.cache_size().unwrap().get(), 1024);
	}

	#[test]
	fn full_file_loads() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(
			file,
			r#"
[server]
addr = "0.0.0.0:8000"
provider = "openai"

[mesh]
zipper = "zipper.internal:9000"
credential = "token:abc"

[caller]
call_timeout_secs = 5
cache_size = 16

[providers.openai]
api_key = "sk-test"
model = "gpt-4o"
"#
		)
		.unwrap();

		let config = BridgeConfig::load(file.path()).unwrap();
		assert_eq!(config.server.addr, "0.0.0.0:8000");
		assert_eq!(config.mesh.credential, "token:abc");
		assert_eq!(config.syncer_config().call_timeout, Duration::from_secs(5));
		assert_eq!(config.cache_size().unwrap().get(), 16);
		assert_eq!(
			config.provider_settings("openai").and_then(|s| s.get("model")).map(String::as_str),
			Some("gpt-4o")
		);
	}

	#[test]
	fn invalid_configs_are_rejected() {
		assert!(matches!(
			BridgeConfig::from_toml_str("[caller]\ncache_size = 0"),
			Err(ConfigError::ZeroCacheSize)
		));
		assert!(matches!(
			BridgeConfig::from_toml_str("[server]\nprovider = \"ghost\""),
			Err(ConfigError::UnknownProvider(name)) if name == "ghost"
		));
		assert!(matches!(
			BridgeConfig::from_toml_str("[server]\nport = 1"),
			Err(ConfigError::Parse(_))
		));
		assert!(matches!(
			BridgeConfig::load("/nonexistent/sluice.toml"),
			Err(ConfigError::Read { .. })
		));
	}
}
