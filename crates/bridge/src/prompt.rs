use sluice_caller::{SystemPrompt, SystemPromptOp};

use crate::chat::{ChatMessage, Role};

/// Combines the caller's system prompt with the client's messages.
///
/// Only the first system message survives; it is rewritten according to the policy.
/// When the client sent no system message, a non-empty prompt is prepended.
pub fn apply_system_prompt(messages: Vec<ChatMessage>, prompt: &SystemPrompt) -> Vec<ChatMessage> {
	let text = prompt.text.as_str();
	match prompt.op {
		SystemPromptOp::Disabled => return messages,
		SystemPromptOp::Overwrite if text.is_empty() => return messages,
		SystemPromptOp::ClientPreferred if messages.iter().any(|m| m.role == Role::System) => return messages,
		_ => {}
	}

	let mut seen_system = false;
	let mut out = Vec::with_capacity(messages.len() + 1);
	for msg in messages {
		if msg.role != Role::System {
			out.push(msg);
			continue;
		}
		if seen_system {
			continue;
		}
		seen_system = true;
		let content = match prompt.op {
			SystemPromptOp::Prefix => format!("{text}\n{}", msg.content),
			_ => text.to_owned(),
		};
		out.push(ChatMessage::system(content));
	}

	if !seen_system && !text.is_empty() {
		out.insert(0, ChatMessage::system(text));
	}
	tracing::trace!(op = ?prompt.op, messages = out.len(), "bridge.prompt.applied");
	out
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use rstest::rstest;

	use super::*;

	fn sys(content: &str) -> ChatMessage {
		ChatMessage::system(content)
	}

	fn user(content: &str) -> ChatMessage {
		ChatMessage::user(content)
	}

	#[rstest]
	#[case::disabled("hello", SystemPromptOp::Disabled, vec![user("hello")], vec![user("hello")])]
	#[case::overwrite_empty_prompt_empty_messages("", SystemPromptOp::Overwrite, vec![], vec![])]
	#[case::empty_prompt_does_not_overwrite("", SystemPromptOp::Overwrite, vec![sys("hello")], vec![sys("hello")])]
	#[case::overwrite("hello", SystemPromptOp::Overwrite, vec![sys("world")], vec![sys("hello")])]
	#[case::prefix_without_system("hello", SystemPromptOp::Prefix, vec![], vec![sys("hello")])]
	#[case::prefix("hello", SystemPromptOp::Prefix, vec![sys("world")], vec![sys("hello\nworld")])]
	#[case::client_preferred_keeps_client(
		"system prompt",
		SystemPromptOp::ClientPreferred,
		vec![sys("client prompt"), user("test")],
		vec![sys("client prompt"), user("test")]
	)]
	#[case::client_preferred_fills_gap(
		"system prompt",
		SystemPromptOp::ClientPreferred,
		vec![user("test")],
		vec![sys("system prompt"), user("test")]
	)]
	#[case::client_preferred_empty_prompt("", SystemPromptOp::ClientPreferred, vec![user("test")], vec![user("test")])]
	#[case::extra_system_messages_dropped(
		"hello",
		SystemPromptOp::Overwrite,
		vec![sys("a"), user("q"), sys("b")],
		vec![sys("hello"), user("q")]
	)]
	fn system_prompt_policies(
		#[case] text: &str,
		#[case] op: SystemPromptOp,
		#[case] messages: Vec<ChatMessage>,
		#[case] expected: Vec<ChatMessage>,
	) {
		let prompt = SystemPrompt {
			text: text.to_owned(),
			op,
		};
		assert_eq!(apply_system_prompt(messages, &prompt), expected);
	}
}
