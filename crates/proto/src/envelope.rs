use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::{RequestId, Tag, ToolCallId, TransactionId};

/// Content substituted for every tool call that did not complete before its round timed out.
pub const TIMEOUT_CONTENT: &str = "timeout in this function calling, you should ignore this.";

/// Function name and JSON-encoded arguments chosen by the LLM.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
	/// Function to invoke.
	pub name: String,
	/// JSON-encoded argument object, passed through untouched.
	#[serde(default)]
	pub arguments: String,
}

/// One tool call requested by an LLM provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
	/// Provider-assigned identifier.
	pub id: ToolCallId,
	/// Tool kind; providers currently only emit `"function"`.
	#[serde(rename = "type", default = "default_tool_type")]
	pub kind: String,
	/// Invocation payload.
	pub function: FunctionCall,
}

fn default_tool_type() -> String {
	"function".to_owned()
}

impl ToolCall {
	/// Creates a function tool call.
	pub fn function(id: impl Into<ToolCallId>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			kind: default_tool_type(),
			function: FunctionCall {
				name: name.into(),
				arguments: arguments.into(),
			},
		}
	}
}

/// Tool calls of one round grouped by the tag that routes them.
pub type TagToolCalls = BTreeMap<Tag, Vec<ToolCall>>;

/// Immutable description of one outbound tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationEnvelope {
	/// Routing key of the worker family that should execute the call.
	pub tag: Tag,
	/// Conversation this call belongs to.
	pub transaction_id: TransactionId,
	/// Fan-out round this call belongs to.
	pub request_id: RequestId,
	/// Identifier of this invocation.
	pub tool_call_id: ToolCallId,
	/// Function to invoke.
	pub function_name: String,
	/// JSON-encoded arguments.
	pub arguments: String,
}

impl InvocationEnvelope {
	/// Builds the envelope for `call` routed to `tag`.
	pub fn new(tag: Tag, transaction_id: &TransactionId, request_id: &RequestId, call: &ToolCall) -> Self {
		Self {
			tag,
			transaction_id: transaction_id.clone(),
			request_id: request_id.clone(),
			tool_call_id: call.id.clone(),
			function_name: call.function.name.clone(),
			arguments: call.function.arguments.clone(),
		}
	}

	/// Completion answering this invocation with `content`.
	pub fn complete(&self, content: impl Into<String>, is_ok: bool) -> CompletionEnvelope {
		CompletionEnvelope {
			request_id: self.request_id.clone(),
			tool_call_id: self.tool_call_id.clone(),
			function_name: self.function_name.clone(),
			content: content.into(),
			is_ok,
		}
	}
}

/// Immutable description of one inbound tool result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionEnvelope {
	/// Round of the invocation being answered.
	pub request_id: RequestId,
	/// Invocation being answered.
	pub tool_call_id: ToolCallId,
	/// Echoed function name, used to label the result.
	pub function_name: String,
	/// Result text, or the error explanation when `is_ok` is false.
	pub content: String,
	/// Whether the remote function succeeded.
	pub is_ok: bool,
}

impl CompletionEnvelope {
	/// Projects the envelope onto the value handed back to the orchestrator.
	pub fn into_result(self) -> CompletionResult {
		CompletionResult {
			tool_call_id: self.tool_call_id,
			function_name: self.function_name,
			content: self.content,
		}
	}
}

/// Result of one tool call as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionResult {
	/// Invocation this result answers.
	pub tool_call_id: ToolCallId,
	/// Function that produced it.
	pub function_name: String,
	/// Result text fed back to the LLM.
	pub content: String,
}

impl CompletionResult {
	/// Synthetic placeholder for a call that did not answer in time.
	pub fn timeout(tool_call_id: ToolCallId, function_name: impl Into<String>) -> Self {
		Self {
			tool_call_id,
			function_name: function_name.into(),
			content: TIMEOUT_CONTENT.to_owned(),
		}
	}

	/// Returns true for a synthetic timeout placeholder.
	pub fn is_timeout(&self) -> bool {
		self.content == TIMEOUT_CONTENT
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn invocation_copies_call_payload() {
		let call = ToolCall::function("call_7", "get_weather", r#"{"city":"Oslo"}"#);
		let env = InvocationEnvelope::new(3, &TransactionId::from("t1"), &RequestId::from("r1"), &call);
		assert_eq!(env.tag, 3);
		assert_eq!(env.tool_call_id.as_str(), "call_7");
		assert_eq!(env.function_name, "get_weather");
		assert_eq!(env.arguments, r#"{"city":"Oslo"}"#);
	}

	#[test]
	fn completion_projects_to_result() {
		let call = ToolCall::function("call_7", "get_weather", "{}");
		let env = InvocationEnvelope::new(3, &TransactionId::default(), &RequestId::from("r1"), &call);
		let result = env.complete("sunny", true).into_result();
		assert_eq!(
			result,
			CompletionResult {
				tool_call_id: ToolCallId::from("call_7"),
				function_name: "get_weather".to_owned(),
				content: "sunny".to_owned(),
			}
		);
		assert!(!result.is_timeout());
		assert!(CompletionResult::timeout(ToolCallId::from("x"), "f").is_timeout());
	}

	#[test]
	fn tool_call_deserializes_provider_shape() {
		let call: ToolCall = serde_json::from_str(r#"{"id":"c1","type":"function","function":{"name":"f","arguments":"{}"}}"#).unwrap();
		assert_eq!(call, ToolCall::function("c1", "f", "{}"));
	}
}
