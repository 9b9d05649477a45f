use std::collections::BTreeMap;

use parking_lot::RwLock;
use sluice_proto::{Tag, TagToolCalls, ToolCall};

use crate::chat::ToolDefinition;
use crate::error::RegistryError;

/// Tools currently served on the mesh, one per tag.
#[derive(Debug, Default)]
pub struct ToolRegistry {
	tools: RwLock<BTreeMap<Tag, ToolDefinition>>,
}

impl ToolRegistry {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `tool` as served on `tag`, replacing whatever the tag served before.
	///
	/// # Errors
	///
	/// [`RegistryError::DuplicateName`] when another tag already serves the same function name.
	pub fn register(&self, tag: Tag, tool: ToolDefinition) -> Result<(), RegistryError> {
		let mut tools = self.tools.write();
		if let Some((&existing, _)) = tools
			.iter()
			.find(|(t, def)| **t != tag && def.function.name == tool.function.name)
		{
			return Err(RegistryError::DuplicateName {
				name: tool.function.name,
				tag: existing,
			});
		}
		tracing::debug!(tag, name = %tool.function.name, "bridge.registry.register");
		tools.insert(tag, tool);
		Ok(())
	}

	/// Removes the tool served on `tag`.
	pub fn unregister(&self, tag: Tag) -> Option<ToolDefinition> {
		let removed = self.tools.write().remove(&tag);
		if removed.is_some() {
			tracing::debug!(tag, "bridge.registry.unregister");
		}
		removed
	}

	/// Snapshot ordered by tag.
	pub fn list(&self) -> Vec<(Tag, ToolDefinition)> {
		self.tools.read().iter().map(|(&tag, def)| (tag, def.clone())).collect()
	}

	/// Number of registered tools.
	pub fn len(&self) -> usize {
		self.tools.read().len()
	}

	/// Returns true when no tool is registered.
	pub fn is_empty(&self) -> bool {
		self.tools.read().is_empty()
	}
}

/// Groups `tool_calls` by the tag whose tool has the same kind and function name.
///
/// Calls that match no registered tool are left out.
pub fn find_tag_tools(tools: &[(Tag, ToolDefinition)], tool_calls: &[ToolCall]) -> TagToolCalls {
	let mut grouped = TagToolCalls::new();
	for call in tool_calls {
		let mut matched = false;
		for (tag, def) in tools {
			if def.function.name == call.function.name && def.kind == call.kind {
				grouped.entry(*tag).or_default().push(call.clone());
				matched = true;
			}
		}
		if !matched {
			tracing::warn!(tool_call_id = %call.id, name = %call.function.name, "bridge.tools.unmatched_call");
		}
	}
	grouped
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	fn tool(name: &str) -> ToolDefinition {
		ToolDefinition::function(name, format!("{name} tool"), serde_json::json!({"type": "object"}))
	}

	#[test]
	fn duplicate_names_are_rejected_across_tags() {
		let registry = ToolRegistry::new();
		registry.register(1, tool("get_weather")).unwrap();
		registry.register(1, tool("get_weather")).unwrap();

		assert_eq!(
			registry.register(2, tool("get_weather")),
			Err(RegistryError::DuplicateName {
				name: "get_weather".into(),
				tag: 1,
			})
		);
		assert_eq!(registry.len(), 1);
	}

	#[test]
	fn list_is_ordered_by_tag_and_unregister_removes() {
		let registry = ToolRegistry::new();
		registry.register(9, tool("b")).unwrap();
		registry.register(3, tool("a")).unwrap();

		let tags: Vec<Tag> = registry.list().into_iter().map(|(tag, _)| tag).collect();
		assert_eq!(tags, [3, 9]);

		assert_eq!(registry.unregister(3).map(|t| t.function.name), Some("a".into()));
		assert!(registry.unregister(3).is_none());
		assert_eq!(registry.len(), 1);
	}

	#[test]
	fn tool_calls_are_grouped_by_matching_tag() {
		let tools = vec![(1, tool("get_weather")), (2, tool("convert"))];
		let calls = vec![
			ToolCall::function("c1", "get_weather", r#"{"city":"Oslo"}"#),
			ToolCall::function("c2", "convert", "{}"),
			ToolCall::function("c3", "get_weather", r#"{"city":"Lima"}"#),
			ToolCall::function("c4", "unknown", "{}"),
		];

		let grouped = find_tag_tools(&tools, &calls);
		let ids = |tag: Tag| grouped[&tag].iter().map(|c| c.id.as_str()).collect::<Vec<_>>();
		assert_eq!(grouped.len(), 2);
		assert_eq!(ids(1), ["c1", "c3"]);
		assert_eq!(ids(2), ["c2"]);
	}
}
