use std::num::NonZeroUsize;
use std::time::Duration;

/// Default wait applied to every [`crate::CallSyncer::call`].
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Tunables of one correlation engine.
#[derive(Debug, Clone)]
pub struct SyncerConfig {
	/// How long a call waits for its completions before degrading to timeout placeholders.
	pub call_timeout: Duration,
	/// How many finished request ids are remembered so their late completions are dropped.
	pub retired_capacity: NonZeroUsize,
	/// How long a completion may sit in the orphan buffer without its call registering.
	pub orphan_ttl: Duration,
	/// How often the coordination task sweeps expired orphans.
	pub sweep_interval: Duration,
	/// How long [`crate::CallSyncer::close`] waits for the coordination task to stop.
	pub close_timeout: Duration,
}

impl Default for SyncerConfig {
	fn default() -> Self {
		Self {
			call_timeout: DEFAULT_CALL_TIMEOUT,
			retired_capacity: NonZeroUsize::new(1024).unwrap_or(NonZeroUsize::MIN),
			orphan_ttl: Duration::from_secs(120),
			sweep_interval: Duration::from_secs(30),
			close_timeout: Duration::from_secs(5),
		}
	}
}

impl SyncerConfig {
	/// Sets the per-call timeout.
	#[must_use]
	pub fn call_timeout(mut self, timeout: Duration) -> Self {
		self.call_timeout = timeout;
		self
	}

	/// Sets how many retired request ids are remembered. Zero is clamped to one.
	#[must_use]
	pub fn retired_capacity(mut self, capacity: usize) -> Self {
		self.retired_capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
		self
	}

	/// Sets the orphan buffer TTL.
	#[must_use]
	pub fn orphan_ttl(mut self, ttl: Duration) -> Self {
		self.orphan_ttl = ttl;
		self
	}

	/// Sets the orphan sweep period. Periods under a millisecond are clamped.
	#[must_use]
	pub fn sweep_interval(mut self, interval: Duration) -> Self {
		self.sweep_interval = interval;
		self
	}

	/// Sets the close join timeout.
	#[must_use]
	pub fn close_timeout(mut self, timeout: Duration) -> Self {
		self.close_timeout = timeout;
		self
	}
}
