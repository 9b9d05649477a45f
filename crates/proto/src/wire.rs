//! JSON frame exchanged with remote functions.
//!
//! Invocations and completions share one frame shape. An invocation leaves `result`
//! empty; a completion echoes the correlation fields and fills `result` and `is_ok`.
//! The reducer rejects any frame without a `req_id`, since it cannot be correlated.

use serde::{Deserialize, Serialize};

use crate::envelope::{CompletionEnvelope, InvocationEnvelope};
use crate::ids::{RequestId, Tag, ToolCallId, TransactionId};

/// Errors raised while encoding or decoding a frame.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
	/// The payload carried no bytes at all.
	#[error("empty function call frame")]
	Empty,
	/// The payload was not a valid frame.
	#[error("malformed function call frame: {0}")]
	Json(#[from] serde_json::Error),
	/// The frame decoded but carries no request id.
	#[error("function call frame has no request id")]
	MissingRequestId,
}

/// Serialized form of one function call, in either direction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCallFrame {
	/// Transaction id of the conversation.
	#[serde(rename = "tid", default, skip_serializing_if = "String::is_empty")]
	pub transaction_id: String,
	/// Request id of the fan-out round.
	#[serde(rename = "req_id", default)]
	pub request_id: String,
	/// Result text written by the function.
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub result: String,
	/// JSON-encoded arguments.
	#[serde(default)]
	pub arguments: String,
	/// Tool call being answered.
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub tool_call_id: String,
	/// Function name.
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub function_name: String,
	/// Whether the function succeeded.
	#[serde(default)]
	pub is_ok: bool,
}

impl FunctionCallFrame {
	fn decode(payload: &[u8]) -> Result<Self, WireError> {
		if payload.is_empty() {
			return Err(WireError::Empty);
		}
		let frame: Self = serde_json::from_slice(payload)?;
		if frame.request_id.is_empty() {
			return Err(WireError::MissingRequestId);
		}
		Ok(frame)
	}
}

/// Encodes an outbound invocation.
pub fn encode_invocation(env: &InvocationEnvelope) -> Result<Vec<u8>, WireError> {
	let frame = FunctionCallFrame {
		transaction_id: env.transaction_id.as_str().to_owned(),
		request_id: env.request_id.as_str().to_owned(),
		result: String::new(),
		arguments: env.arguments.clone(),
		tool_call_id: env.tool_call_id.as_str().to_owned(),
		function_name: env.function_name.clone(),
		is_ok: false,
	};
	Ok(serde_json::to_vec(&frame)?)
}

/// Decodes an invocation received by a remote function listening on `tag`.
pub fn decode_invocation(tag: Tag, payload: &[u8]) -> Result<InvocationEnvelope, WireError> {
	let frame = FunctionCallFrame::decode(payload)?;
	Ok(InvocationEnvelope {
		tag,
		transaction_id: TransactionId::new(frame.transaction_id),
		request_id: RequestId::new(frame.request_id),
		tool_call_id: ToolCallId::new(frame.tool_call_id),
		function_name: frame.function_name,
		arguments: frame.arguments,
	})
}

/// Encodes a completion written back towards the reducer.
///
/// The transaction id and arguments of the invocation are carried along so the
/// frame stays self-describing for multi-turn consumers.
pub fn encode_completion(invocation: &InvocationEnvelope, completion: &CompletionEnvelope) -> Result<Vec<u8>, WireError> {
	let frame = FunctionCallFrame {
		transaction_id: invocation.transaction_id.as_str().to_owned(),
		request_id: completion.request_id.as_str().to_owned(),
		result: completion.content.clone(),
		arguments: invocation.arguments.clone(),
		tool_call_id: completion.tool_call_id.as_str().to_owned(),
		function_name: completion.function_name.clone(),
		is_ok: completion.is_ok,
	};
	Ok(serde_json::to_vec(&frame)?)
}

/// Decodes a completion observed by the reducer.
pub fn decode_completion(payload: &[u8]) -> Result<CompletionEnvelope, WireError> {
	let frame = FunctionCallFrame::decode(payload)?;
	Ok(CompletionEnvelope {
		request_id: RequestId::new(frame.request_id),
		tool_call_id: ToolCallId::new(frame.tool_call_id),
		function_name: frame.function_name,
		content: frame.result,
		is_ok: frame.is_ok,
	})
}
