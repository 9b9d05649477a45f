use serde::{Deserialize, Serialize};

/// Opaque routing key selecting which family of remote functions receives a frame.
pub type Tag = u32;

/// Tag observed by the reducer; remote functions write their completions here.
pub const REDUCER_TAG: Tag = 0xE001;

macro_rules! string_id {
	($(#[$meta:meta])* $name:ident) => {
		$(#[$meta])*
		#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(String);

		impl $name {
			/// Wraps an existing identifier.
			pub fn new(id: impl Into<String>) -> Self {
				Self(id.into())
			}

			/// Borrows the identifier text.
			pub fn as_str(&self) -> &str {
				&self.0
			}

			/// Returns true for the empty identifier, which never correlates with anything.
			pub fn is_empty(&self) -> bool {
				self.0.is_empty()
			}
		}

		impl std::fmt::Display for $name {
			fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
				f.write_str(&self.0)
			}
		}

		impl From<&str> for $name {
			fn from(id: &str) -> Self {
				Self(id.to_owned())
			}
		}

		impl From<String> for $name {
			fn from(id: String) -> Self {
				Self(id)
			}
		}

		impl std::borrow::Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
	};
}

string_id! {
	/// Spans a whole multi-turn LLM conversation.
	TransactionId
}

string_id! {
	/// Spans one fan-out/fan-in round within a conversation.
	RequestId
}

string_id! {
	/// Identifies one tool invocation; assigned by the LLM provider.
	ToolCallId
}

impl TransactionId {
	/// Generates a fresh random transaction id.
	pub fn generate() -> Self {
		Self(uuid::Uuid::new_v4().simple().to_string())
	}
}

impl RequestId {
	/// Generates a fresh random request id, unique per fan-out round.
	pub fn generate() -> Self {
		Self(uuid::Uuid::new_v4().simple().to_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn generated_request_ids_are_unique_and_non_empty() {
		let a = RequestId::generate();
		let b = RequestId::generate();
		assert!(!a.is_empty());
		assert_ne!(a, b);
		assert_eq!(a.as_str().len(), 32);
	}

	#[test]
	fn ids_serialize_as_bare_strings() {
		let id = ToolCallId::from("call_1");
		assert_eq!(serde_json::to_string(&id).ok().as_deref(), Some("\"call_1\""));
		assert_eq!(id.to_string(), "call_1");
	}
}
