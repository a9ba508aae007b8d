use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use crate::assets::loader::{AssetKey, AssetLoader, LoadedAsset};
use crate::foundation::error::{VidstampError, VidstampResult};

/// Shared, read-only handle to a resident asset.
pub type AssetHandle = Arc<LoadedAsset>;

#[derive(Clone, Debug)]
struct LoadFailure {
    message: String,
    transient: bool,
}

#[derive(Debug, Default)]
struct Slot {
    cell: OnceLock<Result<AssetHandle, LoadFailure>>,
    last_used: AtomicU64,
}

#[derive(Debug, Default)]
struct CacheInner {
    slots: HashMap<AssetKey, Arc<Slot>>,
    loads: HashMap<AssetKey, u64>,
    tick: u64,
}

/// Batch-scoped asset cache with single-flight loading.
///
/// Concurrent [`AssetCache::get`] calls for one key run the loader exactly once; the other
/// callers block until that load finishes and share its result. Successful loads stay resident
/// until [`AssetCache::clear`] or drop. Failed loads are handed to every caller waiting on them
/// and then forgotten, so a later retry loads again.
///
/// With `max_entries` set, the least recently used entries that no caller currently holds are
/// evicted once the cache grows past the bound.
pub struct AssetCache {
    loader: Arc<dyn AssetLoader>,
    inner: Mutex<CacheInner>,
    max_entries: Option<usize>,
    total_loads: AtomicU64,
}

impl std::fmt::Debug for AssetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetCache")
            .field("max_entries", &self.max_entries)
            .field("total_loads", &self.total_loads.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl AssetCache {
    /// Empty, unbounded cache over `loader`.
    pub fn new(loader: Arc<dyn AssetLoader>) -> Self {
        Self {
            loader,
            inner: Mutex::new(CacheInner::default()),
            max_entries: None,
            total_loads: AtomicU64::new(0),
        }
    }

    /// Bound the number of resident entries. `None` keeps everything until [`AssetCache::clear`].
    pub fn with_max_entries(mut self, max_entries: Option<usize>) -> Self {
        self.max_entries = max_entries.map(|n| n.max(1));
        self
    }

    fn lock(&self) -> VidstampResult<MutexGuard<'_, CacheInner>> {
        self.inner
            .lock()
            .map_err(|_| VidstampError::Other(anyhow::anyhow!("asset cache lock poisoned")))
    }

    /// Return the resident asset for `key`, loading it on first use.
    #[tracing::instrument(level = "debug", skip(self), fields(source = %key.source.display()))]
    pub fn get(&self, key: &AssetKey) -> VidstampResult<AssetHandle> {
        let slot = {
            let mut inner = self.lock()?;
            inner.tick += 1;
            let tick = inner.tick;
            let slot = Arc::clone(inner.slots.entry(key.clone()).or_default());
            slot.last_used.store(tick, Ordering::Relaxed);
            slot
        };

        let result = slot.cell.get_or_init(|| {
            self.total_loads.fetch_add(1, Ordering::Relaxed);
            if let Ok(mut inner) = self.inner.lock() {
                *inner.loads.entry(key.clone()).or_insert(0) += 1;
            }
            tracing::debug!("loading asset");
            // A panicking loader fails this key like any other load error.
            catch_unwind(AssertUnwindSafe(|| self.loader.load(key)))
                .unwrap_or_else(|_| {
                    Err(VidstampError::cache_load(
                        key.describe(),
                        "asset loader panicked",
                        false,
                    ))
                })
                .map(Arc::new)
                .map_err(|e| LoadFailure {
                    transient: e.is_transient(),
                    message: match e {
                        VidstampError::CacheLoad { message, .. } => message,
                        other => other.to_string(),
                    },
                })
        });

        match result {
            Ok(handle) => {
                let handle = Arc::clone(handle);
                drop(slot);
                self.evict_if_needed(key)?;
                Ok(handle)
            }
            Err(failure) => {
                let failure = failure.clone();
                let mut inner = self.lock()?;
                if inner
                    .slots
                    .get(key)
                    .is_some_and(|current| Arc::ptr_eq(current, &slot))
                {
                    inner.slots.remove(key);
                }
                tracing::warn!(message = %failure.message, transient = failure.transient, "asset load failed");
                Err(VidstampError::cache_load(
                    key.describe(),
                    failure.message,
                    failure.transient,
                ))
            }
        }
    }

    fn evict_if_needed(&self, just_used: &AssetKey) -> VidstampResult<()> {
        let Some(max) = self.max_entries else {
            return Ok(());
        };
        let mut inner = self.lock()?;
        if inner.slots.len() <= max {
            return Ok(());
        }

        let mut idle: Vec<(u64, AssetKey)> = inner
            .slots
            .iter()
            .filter(|(k, slot)| {
                *k != just_used
                    && Arc::strong_count(slot) == 1
                    && matches!(slot.cell.get(), Some(Ok(h)) if Arc::strong_count(h) == 1)
            })
            .map(|(k, slot)| (slot.last_used.load(Ordering::Relaxed), k.clone()))
            .collect();
        idle.sort_by_key(|(tick, _)| *tick);

        let excess = inner.slots.len() - max;
        for (_, k) in idle.into_iter().take(excess) {
            tracing::debug!(source = %k.source.display(), "evicting idle asset");
            inner.slots.remove(&k);
        }
        Ok(())
    }

    /// Number of times the loader ran for `key` since the last [`AssetCache::clear`].
    pub fn load_count(&self, key: &AssetKey) -> u64 {
        self.inner
            .lock()
            .map(|inner| inner.loads.get(key).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Loader runs over the cache's whole lifetime. Not reset by [`AssetCache::clear`].
    pub fn total_loads(&self) -> u64 {
        self.total_loads.load(Ordering::Relaxed)
    }

    /// Number of resident (or in-flight) entries.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.slots.len()).unwrap_or(0)
    }

    /// Whether nothing is resident or in flight.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` is resident or currently loading.
    pub fn contains(&self, key: &AssetKey) -> bool {
        self.inner
            .lock()
            .map(|i| i.slots.contains_key(key))
            .unwrap_or(false)
    }

    /// Drop every resident asset and reset the per-key load counts. Called at batch teardown.
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            let n = inner.slots.len();
            inner.slots.clear();
            inner.loads.clear();
            tracing::debug!(entries = n, "asset cache cleared");
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/assets/cache.rs"]
mod tests;
