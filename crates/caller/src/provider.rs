use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use sluice_syncer::SyncerConfig;
use sluice_worker::{TaskClass, spawn};

use crate::caller::{Caller, Metadata};
use crate::error::{MeshError, Result};
use crate::memory::MemoryMesh;
use crate::mesh::{Source, StreamFunction};

/// Default number of callers kept alive at once.
pub const DEFAULT_CACHE_SIZE: NonZeroUsize = NonZeroUsize::new(1024).unwrap();

/// Opens the source and reducer connections for a credential.
pub type MeshConnector =
	Arc<dyn Fn(&str) -> std::result::Result<(Arc<dyn Source>, Arc<dyn StreamFunction>), MeshError> + Send + Sync>;

/// Resolves the metadata attached to a credential.
pub type MetadataExchanger = Arc<dyn Fn(&str) -> Result<Metadata> + Send + Sync>;

/// Metadata exchanger that attaches nothing.
pub fn empty_metadata() -> MetadataExchanger {
	Arc::new(|_: &str| -> Result<Metadata> { Ok(Metadata::new()) })
}

/// Mesh connector opening connections on an in-process mesh.
pub fn memory_connector(mesh: MemoryMesh) -> MeshConnector {
	Arc::new(move |_: &str| -> std::result::Result<(Arc<dyn Source>, Arc<dyn StreamFunction>), MeshError> {
		let source: Arc<dyn Source> = Arc::new(mesh.source());
		let reducer: Arc<dyn StreamFunction> = Arc::new(mesh.stream_function());
		Ok((source, reducer))
	})
}

/// Credential-keyed cache of [`Caller`]s.
///
/// A caller is built on first use of its credential and reused afterwards. When the
/// cache is full the least recently used caller is evicted and closed in the background.
pub struct CallerProvider {
	callers: Mutex<LruCache<String, Arc<Caller>>>,
	connect: MeshConnector,
	exchange: MetadataExchanger,
	config: SyncerConfig,
}

impl std::fmt::Debug for CallerProvider {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let callers = self.callers.lock();
		f.debug_struct("CallerProvider")
			.field("cached", &callers.len())
			.field("capacity", &callers.cap())
			.finish_non_exhaustive()
	}
}

impl CallerProvider {
	/// Creates an empty provider.
	pub fn new(capacity: NonZeroUsize, config: SyncerConfig, connect: MeshConnector, exchange: MetadataExchanger) -> Self {
		Self {
			callers: Mutex::new(LruCache::new(capacity)),
			connect,
			exchange,
			config,
		}
	}

	/// Returns the caller for `credential`, creating it on first use.
	pub fn provide(&self, credential: &str) -> Result<Arc<Caller>> {
		if let Some(caller) = self.callers.lock().get(credential) {
			return Ok(Arc::clone(caller));
		}

		let metadata = (self.exchange)(credential)?;
		let (source, reducer) = (self.connect)(credential)?;
		let caller = Arc::new(Caller::new(credential, source, reducer, metadata, self.config.clone())?);

		let evicted = {
			let mut callers = self.callers.lock();
			if let Some(existing) = callers.get(credential) {
				// Lost a race with a concurrent provide; keep the cached one.
				let existing = Arc::clone(existing);
				drop(callers);
				retire(caller);
				return Ok(existing);
			}
			callers.push(credential.to_owned(), Arc::clone(&caller))
		};
		if let Some((_, evicted)) = evicted {
			tracing::debug!("caller.provider.evict");
			retire(evicted);
		}
		tracing::debug!("caller.provider.created");
		Ok(caller)
	}

	/// Number of cached callers.
	pub fn len(&self) -> usize {
		self.callers.lock().len()
	}

	/// Returns true when no caller is cached.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Removes and closes every cached caller.
	pub async fn close_all(&self) {
		let callers: Vec<Arc<Caller>> = {
			let mut cache = self.callers.lock();
			let mut drained = Vec::with_capacity(cache.len());
			while let Some((_, caller)) = cache.pop_lru() {
				drained.push(caller);
			}
			drained
		};
		for caller in callers {
			if let Err(err) = caller.close().await {
				tracing::warn!(error = %err, "caller.provider.close_failed");
			}
		}
	}
}

fn retire(caller: Arc<Caller>) {
	spawn(TaskClass::Teardown, async move {
		if let Err(err) = caller.close().await {
			tracing::warn!(error = %err, "caller.provider.close_failed");
		}
	});
}
