use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use sluice_caller::Metadata;

use crate::chat::{ChatRequest, ChatResponse};
use crate::error::ProviderError;

/// Seam towards an LLM vendor.
#[async_trait]
pub trait LlmProvider: Send + Sync {
	/// Name used to select the provider from configuration.
	fn name(&self) -> &str;

	/// Runs one non-streaming chat completion.
	async fn chat_completion(&self, request: ChatRequest, metadata: &Metadata) -> Result<ChatResponse, ProviderError>;
}

/// Provider implementations available to the bridge, keyed by name.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
	providers: BTreeMap<String, Arc<dyn LlmProvider>>,
}

impl std::fmt::Debug for ProviderRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_list().entries(self.providers.keys()).finish()
	}
}

impl ProviderRegistry {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds `provider` under its own name, replacing any previous one.
	pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
		self.providers.insert(provider.name().to_owned(), provider);
	}

	/// Provider registered as `name`.
	pub fn get(&self, name: &str) -> Option<Arc<dyn LlmProvider>> {
		self.providers.get(name).cloned()
	}

	/// Provider chosen when configuration names none: the first by name.
	pub fn first(&self) -> Option<Arc<dyn LlmProvider>> {
		self.providers.values().next().cloned()
	}

	/// Registered names in order.
	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.providers.keys().map(String::as_str)
	}
}
