use std::future::Future;
use std::sync::Arc;

use sluice_caller::{CallerProvider, MeshConnector, MetadataExchanger, SystemPromptOp};
use sluice_proto::{RequestId, TransactionId};
use tokio_util::sync::CancellationToken;

use crate::chat::{ChatMessage, ChatRequest, ChatResponse};
use crate::config::BridgeConfig;
use crate::error::{ConfigError, Error, ProviderError, Result};
use crate::prompt::apply_system_prompt;
use crate::provider::{LlmProvider, ProviderRegistry};
use crate::registry::{ToolRegistry, find_tag_tools};

/// Orchestrates tool-calling chat completions.
///
/// A request goes to the provider with every registered tool attached. When the model
/// asks for tool calls, they are fanned out over the credential's caller, and their
/// results go back to the provider in a second request.
pub struct Service {
	callers: Arc<CallerProvider>,
	provider: Arc<dyn LlmProvider>,
	tools: Arc<ToolRegistry>,
}

impl std::fmt::Debug for Service {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Service")
			.field("provider", &self.provider.name())
			.field("callers", &self.callers)
			.field("tools", &self.tools.len())
			.finish()
	}
}

impl Service {
	/// Assembles a service from its parts.
	pub fn new(callers: Arc<CallerProvider>, provider: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>) -> Self {
		Self {
			callers,
			provider,
			tools,
		}
	}

	/// Builds a service from configuration, picking the configured provider from `providers`.
	pub fn from_config(
		config: &BridgeConfig,
		providers: &ProviderRegistry,
		connect: MeshConnector,
		exchange: MetadataExchanger,
	) -> Result<Self> {
		config.validate()?;
		let selected = &config.server.provider;
		let provider = if selected.is_empty() {
			providers.first()
		} else {
			providers.get(selected)
		}
		.ok_or_else(|| ConfigError::MissingProvider(selected.clone()))?;

		let callers = CallerProvider::new(config.cache_size()?, config.syncer_config(), connect, exchange);
		tracing::info!(provider = provider.name(), addr = %config.server.addr, "bridge.service.configured");
		Ok(Self::new(Arc::new(callers), provider, Arc::new(ToolRegistry::new())))
	}

	/// Tools exposed to the model.
	pub fn tools(&self) -> &ToolRegistry {
		&self.tools
	}

	/// Caller cache.
	pub fn callers(&self) -> &CallerProvider {
		&self.callers
	}

	/// Sets the system prompt override of `credential`'s caller.
	pub fn set_system_prompt(&self, credential: &str, text: impl Into<String>, op: SystemPromptOp) -> Result<()> {
		self.callers.provide(credential)?.set_system_prompt(text, op);
		Ok(())
	}

	/// Runs one chat completion, executing any tool calls the model requests.
	///
	/// Token usage of both provider rounds is summed into the returned response.
	pub async fn chat_completions(
		&self,
		credential: &str,
		transaction_id: &TransactionId,
		mut request: ChatRequest,
		cancel: &CancellationToken,
	) -> Result<ChatResponse> {
		let caller = self.callers.provide(credential)?;
		let tools = self.tools.list();
		if !tools.is_empty() {
			request.tools = tools.iter().map(|(_, def)| def.clone()).collect();
		}
		request.messages = apply_system_prompt(std::mem::take(&mut request.messages), &caller.system_prompt());

		let first = self.ask(request.clone(), caller.metadata(), cancel).await?;
		let Some(assistant) = first.requested_tool_calls().cloned() else {
			tracing::debug!(%transaction_id, "bridge.chat.no_tool_calls");
			return Ok(first);
		};

		let calls = find_tag_tools(&tools, &assistant.tool_calls);
		let request_id = RequestId::generate();
		tracing::debug!(
			%transaction_id,
			%request_id,
			requested = assistant.tool_calls.len(),
			tags = calls.len(),
			"bridge.chat.run_tools"
		);
		let results = caller.call(cancel, transaction_id, &request_id, &calls).await?;

		request.messages.push(assistant);
		request.messages.extend(results.into_iter().map(ChatMessage::tool));
		request.tools.clear();

		let mut second = self.ask(request, caller.metadata(), cancel).await?;
		second.usage += first.usage;
		Ok(second)
	}

	async fn ask(
		&self,
		request: ChatRequest,
		metadata: &sluice_caller::Metadata,
		cancel: &CancellationToken,
	) -> Result<ChatResponse> {
		let response = until_cancelled(cancel, self.provider.chat_completion(request, metadata)).await?;
		if response.choices.is_empty() {
			return Err(ProviderError::EmptyResponse.into());
		}
		Ok(response)
	}
}

async fn until_cancelled<F, T>(cancel: &CancellationToken, fut: F) -> Result<T>
where
	F: Future<Output = std::result::Result<T, ProviderError>>,
{
	match cancel.run_until_cancelled(fut).await {
		Some(res) => Ok(res?),
		None => Err(Error::Cancelled),
	}
}
