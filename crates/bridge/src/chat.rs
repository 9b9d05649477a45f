//! Chat-completion shapes exchanged with LLM providers.

use std::ops::AddAssign;

use serde::{Deserialize, Serialize};
use sluice_proto::{CompletionResult, ToolCall, ToolCallId};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	/// Instructions for the model.
	System,
	/// End-user input.
	User,
	/// Model output.
	Assistant,
	/// Result of a tool call.
	Tool,
}

/// One message of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
	/// Author.
	pub role: Role,
	/// Text content.
	#[serde(default)]
	pub content: String,
	/// Tool calls requested by an assistant message.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub tool_calls: Vec<ToolCall>,
	/// Tool call answered by a tool message.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tool_call_id: Option<ToolCallId>,
}

impl ChatMessage {
	fn plain(role: Role, content: impl Into<String>) -> Self {
		Self {
			role,
			content: content.into(),
			tool_calls: Vec::new(),
			tool_call_id: None,
		}
	}

	/// System message.
	pub fn system(content: impl Into<String>) -> Self {
		Self::plain(Role::System, content)
	}

	/// User message.
	pub fn user(content: impl Into<String>) -> Self {
		Self::plain(Role::User, content)
	}

	/// Assistant message with text content.
	pub fn assistant(content: impl Into<String>) -> Self {
		Self::plain(Role::Assistant, content)
	}

	/// Assistant message requesting `tool_calls`.
	pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
		Self {
			tool_calls,
			..Self::plain(Role::Assistant, "")
		}
	}

	/// Tool message carrying one call result.
	pub fn tool(result: CompletionResult) -> Self {
		Self {
			tool_call_id: Some(result.tool_call_id),
			..Self::plain(Role::Tool, result.content)
		}
	}
}

/// Function exposed to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDefinition {
	/// Function name; unique across the registry.
	pub name: String,
	/// What the function does, shown to the model.
	#[serde(default)]
	pub description: String,
	/// JSON schema of the arguments.
	#[serde(default)]
	pub parameters: serde_json::Value,
}

/// Tool exposed to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDefinition {
	/// Tool kind; `"function"`.
	#[serde(rename = "type")]
	pub kind: String,
	/// Function payload.
	pub function: FunctionDefinition,
}

impl ToolDefinition {
	/// Function tool.
	pub fn function(name: impl Into<String>, description: impl Into<String>, parameters: serde_json::Value) -> Self {
		Self {
			kind: "function".to_owned(),
			function: FunctionDefinition {
				name: name.into(),
				description: description.into(),
				parameters,
			},
		}
	}
}

/// Chat completion request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
	/// Model name; empty lets the provider choose.
	#[serde(default)]
	pub model: String,
	/// Conversation so far.
	pub messages: Vec<ChatMessage>,
	/// Tools the model may call.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub tools: Vec<ToolDefinition>,
}

/// Why the model stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
	/// Natural end.
	Stop,
	/// Token limit.
	Length,
	/// The model requested tool calls.
	ToolCalls,
	/// Output withheld by a filter.
	ContentFilter,
}

/// One candidate answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
	/// Position among the candidates.
	#[serde(default)]
	pub index: u32,
	/// Candidate message.
	pub message: ChatMessage,
	/// Stop reason.
	#[serde(default)]
	pub finish_reason: Option<FinishReason>,
}

/// Token accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
	/// Prompt tokens.
	pub prompt_tokens: u32,
	/// Completion tokens.
	pub completion_tokens: u32,
	/// Sum of both.
	pub total_tokens: u32,
}

impl AddAssign for Usage {
	fn add_assign(&mut self, rhs: Self) {
		self.prompt_tokens = self.prompt_tokens.saturating_add(rhs.prompt_tokens);
		self.completion_tokens = self.completion_tokens.saturating_add(rhs.completion_tokens);
		self.total_tokens = self.total_tokens.saturating_add(rhs.total_tokens);
	}
}

/// Chat completion response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
	/// Provider-assigned id.
	#[serde(default)]
	pub id: String,
	/// Model that answered.
	#[serde(default)]
	pub model: String,
	/// Candidates; the first one is used.
	pub choices: Vec<Choice>,
	/// Token accounting.
	#[serde(default)]
	pub usage: Usage,
}

impl ChatResponse {
	/// Assistant message of the first choice when it requests tool calls.
	pub fn requested_tool_calls(&self) -> Option<&ChatMessage> {
		let choice = self.choices.first()?;
		let wants_tools =
			choice.finish_reason == Some(FinishReason::ToolCalls) || !choice.message.tool_calls.is_empty();
		wants_tools.then_some(&choice.message)
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn tool_message_serializes_call_id() {
		let msg = ChatMessage::tool(CompletionResult {
			tool_call_id: ToolCallId::from("call-1"),
			function_name: "get_weather".into(),
			content: "sunny".into(),
		});
		assert_eq!(
			serde_json::to_value(&msg).unwrap(),
			serde_json::json!({"role": "tool", "content": "sunny", "tool_call_id": "call-1"})
		);
	}

	#[test]
	fn provider_response_with_tool_calls_is_detected() {
		let body = r#"{
			"id": "chatcmpl-1",
			"choices": [{
				"index": 0,
				"finish_reason": "tool_calls",
				"message": {
					"role": "assistant",
					"content": "",
					"tool_calls": [{"id": "call-1", "type": "function", "function": {"name": "f", "arguments": "{}"}}]
				}
			}],
			"usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
		}"#;
		let resp: ChatResponse = serde_json::from_str(body).unwrap();
		let assistant = resp.requested_tool_calls().unwrap();
		assert_eq!(assistant.tool_calls, vec![ToolCall::function("call-1", "f", "{}")]);
		assert_eq!(resp.usage.total_tokens, 15);

		let plain = ChatResponse {
			choices: vec![Choice {
				index: 0,
				message: ChatMessage::assistant("hi"),
				finish_reason: Some(FinishReason::Stop),
			}],
			..ChatResponse::default()
		};
		assert!(plain.requested_tool_calls().is_none());
		assert!(ChatResponse::default().requested_tool_calls().is_none());
	}

	#[test]
	fn usage_sums_saturate() {
		let mut usage = Usage {
			prompt_tokens: u32::MAX - 1,
			completion_tokens: 3,
			total_tokens: u32::MAX,
		};
		usage += Usage {
			prompt_tokens: 5,
			completion_tokens: 4,
			total_tokens: 9,
		};
		assert_eq!(
			usage,
			Usage {
				prompt_tokens: u32::MAX,
				completion_tokens: 7,
				total_tokens: u32::MAX,
			}
		);
	}
}
