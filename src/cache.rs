//! Bounded TTL cache with in-flight request deduplication.
//!
//! Used for parsed footers, decoded rows and index artifacts. Concurrent
//! misses on the same key share a single load: the first caller runs the
//! loader, later callers await its result.

use lru::LruCache;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

use crate::error::Result;

type Slot<V> = Arc<OnceCell<Arc<V>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<LruCache<K, (Instant, Arc<V>)>>,
    inflight: Mutex<HashMap<K, Slot<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Clone,
{
    /// `capacity` of 0 is treated as 1.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            ttl,
            entries: Mutex::new(LruCache::new(capacity)),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Fresh entry for `key`; expired entries are dropped.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let mut entries = lock(&self.entries);
        match entries.get(key) {
            Some((stored, value)) if stored.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                entries.pop(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: Arc<V>) {
        lock(&self.entries).put(key, (Instant::now(), value));
    }

    pub fn invalidate(&self, key: &K) {
        lock(&self.entries).pop(key);
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the cached value or load it once for all concurrent callers.
    ///
    /// A failed load is not cached; the next caller retries.
    pub async fn get_or_try_load<F, Fut>(&self, key: K, load: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }

        let slot: Slot<V> = lock(&self.inflight)
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let result = slot
            .get_or_try_init(|| async { load().await.map(Arc::new) })
            .await
            .cloned();

        if let Ok(value) = &result {
            self.insert(key.clone(), value.clone());
        }
        let mut inflight = lock(&self.inflight);
        if inflight.get(&key).is_some_and(|s| Arc::ptr_eq(s, &slot)) {
            inflight.remove(&key);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_concurrent_misses_share_one_load() {
        let cache: Arc<TtlCache<String, u64>> = Arc::new(TtlCache::new(8, Duration::from_secs(60)));
        let loads = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                let loads = loads.clone();
                tokio::spawn(async move {
                    cache
                        .get_or_try_load("k".to_string(), || async {
                            loads.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok(42)
                        })
                        .await
                })
            })
            .collect();
        for task in tasks {
            assert_eq!(*task.await.unwrap().unwrap(), 42);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_entries_reload() {
        let cache: TtlCache<u32, u32> = TtlCache::new(4, Duration::from_millis(10));
        cache.insert(1, Arc::new(1));
        assert!(cache.get(&1).is_some());
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(cache.get(&1).is_none());

        let v = cache.get_or_try_load(1, || async { Ok(2) }).await.unwrap();
        assert_eq!(*v, 2);
    }

    #[tokio::test]
    async fn test_failed_load_is_not_cached() {
        let cache: TtlCache<u32, u32> = TtlCache::new(4, Duration::from_secs(60));
        let err = cache
            .get_or_try_load(1, || async { Err(StoreError::validation("boom")) })
            .await;
        assert!(err.is_err());
        assert!(cache.is_empty());
        let v = cache.get_or_try_load(1, || async { Ok(7) }).await.unwrap();
        assert_eq!(*v, 7);
    }

    #[test]
    fn test_lru_bound() {
        let cache: TtlCache<u32, u32> = TtlCache::new(2, Duration::from_secs(60));
        for i in 0..3 {
            cache.insert(i, Arc::new(i));
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&0).is_none());
        cache.invalidate(&2);
        assert!(cache.get(&2).is_none());
    }
}
