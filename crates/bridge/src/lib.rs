//! Tool-calling chat completions over the sluice mesh.
//!
//! [`Service::chat_completions`] runs the two-round exchange: the first provider request
//! carries every tool in the [`ToolRegistry`]; tool calls the model asks for are grouped
//! by tag with [`find_tag_tools`] and fanned out through the credential's
//! [`sluice_caller::Caller`]; the results go back to the provider as tool messages.
//!
//! Providers plug in through [`LlmProvider`]. Configuration is read from TOML into
//! [`BridgeConfig`].

mod chat;
mod config;
mod error;
mod prompt;
mod provider;
mod registry;
mod service;


pub use chat::{
	ChatMessage, ChatRequest, ChatResponse, Choice, FinishReason, FunctionDefinition, Role, ToolDefinition, Usage,
};
pub use config::{BridgeConfig, CallerConfig, MeshConfig, ServerConfig};
pub use error::{ConfigError, Error, ProviderError, RegistryError, Result};
pub use prompt::apply_system_prompt;
pub use provider::{LlmProvider, ProviderRegistry};
pub use registry::{ToolRegistry, find_tag_tools};
pub use service::Service;
