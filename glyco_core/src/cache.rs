//! TTL cache with in-flight deduplication for periodic fetches.
//!
//! Pollers recompute IOB/COB every minute; both calculations need the same
//! treatment window. `FetchCache` makes them share one fetch:
//! - A value younger than the TTL is served from the cache
//! - Concurrent callers for a key that is being fetched wait for that fetch
//! - `invalidate()` drops everything at once when the source data changes
//!
//! The cache is an owned object; callers decide its lifetime and scope.

use crate::{Error, Result};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Outcome shared between the leader of a fetch and its waiters
type Shared<V> = std::result::Result<Arc<V>, String>;

enum Slot<V> {
    Ready { value: Arc<V>, fetched_at: Instant },
    InFlight(Arc<OnceCell<Shared<V>>>),
}

pub struct FetchCache<K, V> {
    ttl: Duration,
    slots: Mutex<HashMap<K, Slot<V>>>,
}

impl<K, V> FetchCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached value for `key`, or run `fetcher` once for every
    /// concurrent caller.
    ///
    /// Errors are handed to every waiter of the failed fetch as
    /// [`Error::Fetch`] and are never cached.
    pub fn get_or_fetch<F>(&self, key: K, fetcher: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Result<V>,
    {
        let cell = {
            let mut slots = self.lock();
            match slots.get(&key) {
                Some(Slot::Ready { value, fetched_at }) if fetched_at.elapsed() < self.ttl => {
                    tracing::debug!("Cache hit for {:?}", key);
                    return Ok(Arc::clone(value));
                }
                Some(Slot::InFlight(cell)) => {
                    let cell = Arc::clone(cell);
                    drop(slots);
                    tracing::debug!("Waiting on in-flight fetch for {:?}", key);
                    return cell.wait().clone().map_err(Error::Fetch);
                }
                _ => {}
            }

            let cell = Arc::new(OnceCell::new());
            slots.insert(key.clone(), Slot::InFlight(Arc::clone(&cell)));
            cell
        };

        tracing::debug!("Cache miss for {:?}, fetching", key);
        let outcome: Shared<V> = match panic::catch_unwind(AssertUnwindSafe(fetcher)) {
            Ok(result) => result.map(Arc::new).map_err(|e| e.to_string()),
            Err(payload) => {
                self.settle(&key, &cell, Err("fetcher panicked".to_string()));
                panic::resume_unwind(payload);
            }
        };

        self.settle(&key, &cell, outcome.clone());
        outcome.map_err(Error::Fetch)
    }

    /// Drop every cached and in-flight entry.
    ///
    /// Fetches already running still deliver to their waiters but their
    /// results are not stored.
    pub fn invalidate(&self) {
        let mut slots = self.lock();
        let dropped = slots.len();
        slots.clear();
        tracing::info!("Fetch cache invalidated ({} entries dropped)", dropped);
    }

    pub fn invalidate_key(&self, key: &K) {
        if self.lock().remove(key).is_some() {
            tracing::debug!("Invalidated cache entry {:?}", key);
        }
    }

    /// Number of cached or in-flight keys, fresh or not
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Publish the outcome to waiters and store it if the slot is still ours
    fn settle(&self, key: &K, cell: &Arc<OnceCell<Shared<V>>>, outcome: Shared<V>) {
        let _ = cell.set(outcome.clone());

        let mut slots = self.lock();
        let still_ours = matches!(
            slots.get(key),
            Some(Slot::InFlight(current)) if Arc::ptr_eq(current, cell)
        );
        if !still_ours {
            return;
        }

        match outcome {
            Ok(value) => {
                slots.insert(
                    key.clone(),
                    Slot::Ready {
                        value,
                        fetched_at: Instant::now(),
                    },
                );
            }
            Err(_) => {
                slots.remove(key);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Slot<V>>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_fresh_value_is_served_without_refetch() {
        let cache: FetchCache<&str, Vec<u32>> = FetchCache::new(Duration::from_secs(30));
        let calls = AtomicUsize::new(0);
        let fetch = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1, 2, 3])
        };

        let first = cache.get_or_fetch("window", fetch).unwrap();
        let second = cache.get_or_fetch("window", fetch).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_expired_value_is_refetched() {
        let cache: FetchCache<&str, u32> = FetchCache::new(Duration::ZERO);
        let calls = AtomicUsize::new(0);
        let fetch = || Ok(calls.fetch_add(1, Ordering::SeqCst) as u32);

        assert_eq!(*cache.get_or_fetch("k", fetch).unwrap(), 0);
        assert_eq!(*cache.get_or_fetch("k", fetch).unwrap(), 1);
    }

    #[test]
    fn test_invalidate_forces_refetch() {
        let cache: FetchCache<String, u32> = FetchCache::new(Duration::from_secs(30));
        let calls = AtomicUsize::new(0);
        let fetch = || Ok(calls.fetch_add(1, Ordering::SeqCst) as u32);

        cache.get_or_fetch("a".to_string(), fetch).unwrap();
        cache.get_or_fetch("b".to_string(), fetch).unwrap();
        cache.invalidate();
        assert!(cache.is_empty());

        assert_eq!(*cache.get_or_fetch("a".to_string(), fetch).unwrap(), 2);

        cache.invalidate_key(&"a".to_string());
        assert_eq!(*cache.get_or_fetch("a".to_string(), fetch).unwrap(), 3);
    }

    #[test]
    fn test_concurrent_callers_share_one_fetch() {
        crate::logging::init_test();
        let cache: FetchCache<&str, u32> = FetchCache::new(Duration::from_secs(30));
        let calls = AtomicUsize::new(0);
        let barrier = Barrier::new(2);
        let (cache, calls, barrier) = (&cache, &calls, &barrier);

        let results: Vec<u32> = thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    s.spawn(move || {
                        barrier.wait();
                        *cache
                            .get_or_fetch("treatments", || {
                                calls.fetch_add(1, Ordering::SeqCst);
                                thread::sleep(Duration::from_millis(200));
                                Ok(42)
                            })
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results, vec![42, 42]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_errors_are_shared_but_not_cached() {
        let cache: FetchCache<&str, u32> = FetchCache::new(Duration::from_secs(30));

        let err = cache
            .get_or_fetch("k", || Err(Error::Other("source offline".into())))
            .unwrap_err();
        assert!(matches!(err, Error::Fetch(ref msg) if msg.contains("source offline")));
        assert!(cache.is_empty());

        assert_eq!(*cache.get_or_fetch("k", || Ok(7)).unwrap(), 7);
    }

    #[test]
    fn test_invalidate_during_fetch_discards_result() {
        let cache: FetchCache<&str, u32> = FetchCache::new(Duration::from_secs(30));

        let value = cache
            .get_or_fetch("k", || {
                cache.invalidate();
                Ok(1)
            })
            .unwrap();
        assert_eq!(*value, 1);
        assert!(cache.is_empty());

        assert_eq!(*cache.get_or_fetch("k", || Ok(2)).unwrap(), 2);
    }
}
