//! Shared vocabulary of the sluice function-call mesh.
//!
//! * Correlation identifiers: [`TransactionId`], [`RequestId`], [`ToolCallId`] and the
//!   routing [`Tag`].
//! * Tool calls as produced by an LLM provider ([`ToolCall`]) grouped per tag
//!   ([`TagToolCalls`]).
//! * The immutable envelopes exchanged with remote functions ([`InvocationEnvelope`],
//!   [`CompletionEnvelope`]) and the value handed back to the orchestrator
//!   ([`CompletionResult`]).
//! * The JSON frame carried on the wire ([`wire`]).

#![warn(missing_docs)]

mod envelope;
mod ids;
pub mod wire;

pub use envelope::{CompletionEnvelope, CompletionResult, FunctionCall, InvocationEnvelope, TIMEOUT_CONTENT, TagToolCalls, ToolCall};
pub use ids::{REDUCER_TAG, RequestId, Tag, ToolCallId, TransactionId};
pub use wire::WireError;
