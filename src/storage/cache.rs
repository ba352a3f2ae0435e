use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// TTL cache with typed keys. Entries expire after a fixed duration set at
/// construction; there is no invalidation on writes, so staleness up to the
/// TTL is the accepted contract.
pub struct TtlCache<K, V> {
    entries: DashMap<K, (V, Instant)>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        if let Some(entry) = self.entries.get(key) {
            let (value, expires_at) = entry.value();
            if Instant::now() < *expires_at {
                return Some(value.clone());
            }
            drop(entry);
            self.entries.remove(key);
        }
        None
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(key, (value, Instant::now() + self.ttl));
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    /// Drop every expired entry. Called opportunistically; correctness never
    /// depends on it since `get` checks the deadline itself.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.entries.retain(|_, (_, expires_at)| now < *expires_at);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
