use std::path::PathBuf;
use std::sync::Barrier;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

use super::*;
use crate::assets::loader::AssetKind;

/// Loader that counts calls, optionally stalls, and fails the first `fail_first` loads.
#[derive(Default)]
struct CountingLoader {
    calls: AtomicUsize,
    delay: Duration,
    fail_first: usize,
}

impl AssetLoader for CountingLoader {
    fn load(&self, key: &AssetKey) -> VidstampResult<LoadedAsset> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        if n < self.fail_first {
            return Err(VidstampError::cache_load(key.describe(), "device busy", true));
        }
        Ok(LoadedAsset::Font(key.source.clone()))
    }
}

fn key(name: &str) -> AssetKey {
    AssetKey::media(AssetKind::Font, PathBuf::from(name))
}

#[test]
fn concurrent_gets_for_one_key_load_once() {
    let loader = Arc::new(CountingLoader {
        delay: Duration::from_millis(50),
        ..CountingLoader::default()
    });
    let cache = AssetCache::new(loader.clone());
    let k = key("shared.ttf");
    let n = 8;
    let barrier = Barrier::new(n);

    let handles: Vec<AssetHandle> = std::thread::scope(|s| {
        let workers: Vec<_> = (0..n)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    cache.get(&k).unwrap()
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.load_count(&k), 1);
    assert_eq!(handles.len(), n);
    assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
}

#[test]
fn distinct_keys_load_independently() {
    let loader = Arc::new(CountingLoader::default());
    let cache = AssetCache::new(loader.clone());
    let a = cache.get(&key("a.ttf")).unwrap();
    let b = cache.get(&key("b.ttf")).unwrap();
    let a2 = cache.get(&key("a.ttf")).unwrap();
    assert!(Arc::ptr_eq(&a, &a2));
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(cache.total_loads(), 2);
    assert_eq!(cache.len(), 2);
}

#[test]
fn failed_loads_are_not_kept_resident() {
    let loader = Arc::new(CountingLoader {
        fail_first: 1,
        ..CountingLoader::default()
    });
    let cache = AssetCache::new(loader.clone());
    let k = key("flaky.ttf");

    let err = cache.get(&k).unwrap_err();
    assert!(err.is_transient());
    assert!(err.to_string().contains("flaky.ttf"), "{err}");
    assert!(!cache.contains(&k));

    cache.get(&k).unwrap();
    assert_eq!(cache.load_count(&k), 2);
}

#[test]
fn lru_bound_evicts_only_idle_entries() {
    let loader = Arc::new(CountingLoader::default());
    let cache = AssetCache::new(loader).with_max_entries(Some(2));

    let held = cache.get(&key("a.ttf")).unwrap();
    drop(cache.get(&key("b.ttf")).unwrap());
    drop(cache.get(&key("c.ttf")).unwrap());

    assert_eq!(cache.len(), 2);
    assert!(cache.contains(&key("a.ttf")), "held entry must survive");
    assert!(!cache.contains(&key("b.ttf")));
    assert!(cache.contains(&key("c.ttf")));
    drop(held);
}

#[test]
fn lru_prefers_least_recently_used() {
    let loader = Arc::new(CountingLoader::default());
    let cache = AssetCache::new(loader).with_max_entries(Some(2));

    drop(cache.get(&key("a.ttf")).unwrap());
    drop(cache.get(&key("b.ttf")).unwrap());
    drop(cache.get(&key("a.ttf")).unwrap());
    drop(cache.get(&key("c.ttf")).unwrap());

    assert!(cache.contains(&key("a.ttf")));
    assert!(!cache.contains(&key("b.ttf")));
}

#[test]
fn clear_tears_down_and_reloads() {
    let loader = Arc::new(CountingLoader::default());
    let cache = AssetCache::new(loader.clone());
    let k = key("a.ttf");
    cache.get(&k).unwrap();
    assert_eq!(cache.load_count(&k), 1);
    cache.clear();
    assert!(cache.is_empty());
    assert_eq!(cache.load_count(&k), 0);
    cache.get(&k).unwrap();
    assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn load_counts_restart_after_each_teardown() {
    let loader = Arc::new(CountingLoader::default());
    let cache = AssetCache::new(loader.clone());
    let k = key("bed.ttf");
    for _ in 0..3 {
        cache.get(&k).unwrap();
        cache.get(&k).unwrap();
        assert_eq!(cache.load_count(&k), 1);
        cache.clear();
    }
    assert_eq!(cache.total_loads(), 3);
}

struct PanickingLoader;

impl AssetLoader for PanickingLoader {
    fn load(&self, key: &AssetKey) -> VidstampResult<LoadedAsset> {
        if key.source.ends_with("bad.ttf") {
            panic!("decoder blew up");
        }
        Ok(LoadedAsset::Font(key.source.clone()))
    }
}

#[test]
fn panicking_loader_fails_every_waiter_and_recovers() {
    let cache = AssetCache::new(Arc::new(PanickingLoader));
    let bad = key("bad.ttf");
    let n = 4;
    let barrier = Barrier::new(n);

    let outcomes: Vec<VidstampResult<AssetHandle>> = std::thread::scope(|s| {
        let workers: Vec<_> = (0..n)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    cache.get(&bad)
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });
    for outcome in outcomes {
        let err = outcome.unwrap_err();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("panicked"), "{err}");
    }
    assert!(!cache.contains(&bad));

    cache.get(&key("good.ttf")).unwrap();
}
