/// Execution classes used for task spawning and observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Single-writer loops that own correlation state for their whole lifetime.
	Coordinator,
	/// Inbound frame handling on behalf of the mesh (reducer callbacks, routing).
	Ingest,
	/// Function handlers executed in-process on behalf of a remote worker.
	Remote,
	/// Deferred cleanup that must not hold up the caller, such as closing evicted sessions.
	Teardown,
}

impl TaskClass {
	/// Stable label emitted in trace fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Coordinator => "coordinator",
			Self::Ingest => "ingest",
			Self::Remote => "remote",
			Self::Teardown => "teardown",
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn labels_are_distinct() {
		let labels = [TaskClass::Coordinator, TaskClass::Ingest, TaskClass::Remote, TaskClass::Teardown].map(TaskClass::as_str);
		for (i, a) in labels.iter().enumerate() {
			for b in &labels[i + 1..] {
				assert_ne!(a, b);
			}
		}
	}
}
