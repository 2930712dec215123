//! Adaptive replacement cache
//!
//! Balances a recency list (T1) against a frequency list (T2), each backed
//! by ghost lists (B1, B2) that remember recently evicted keys. A hit on a
//! ghost list shifts the adaptive target `p` toward the list that would
//! have kept the entry, so the cache tunes itself between LRU-like and
//! LFU-like behavior under the observed workload. At most `capacity`
//! entries hold values; the ghost lists hold keys only.

use lru::LruCache;
use std::hash::Hash;

pub struct AdaptiveCache<K: Hash + Eq + Clone, V> {
    capacity: usize,
    // Target size for T1.
    p: usize,
    t1: LruCache<K, V>,
    t2: LruCache<K, V>,
    b1: LruCache<K, ()>,
    b2: LruCache<K, ()>,
}

impl<K: Hash + Eq + Clone, V> AdaptiveCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            p: 0,
            t1: LruCache::unbounded(),
            t2: LruCache::unbounded(),
            b1: LruCache::unbounded(),
            b2: LruCache::unbounded(),
        }
    }

    /// Look up a key. A hit in the recency list promotes the entry to the
    /// frequency list.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        if let Some(value) = self.t1.pop(key) {
            self.t2.put(key.clone(), value);
            return self.t2.get(key);
        }
        self.t2.get(key)
    }

    pub fn put(&mut self, key: K, value: V) {
        // Seen recently: second touch moves it to the frequency list.
        if self.t1.contains(&key) {
            self.t1.pop(&key);
            self.t2.put(key, value);
            return;
        }
        if self.t2.contains(&key) {
            self.t2.put(key, value);
            return;
        }

        // Ghost hit in B1: the recency list was too small.
        if self.b1.contains(&key) {
            let delta = (self.b2.len() / self.b1.len()).max(1);
            self.p = (self.p + delta).min(self.capacity);
            self.replace(false);
            self.b1.pop(&key);
            self.t2.put(key, value);
            return;
        }

        // Ghost hit in B2: the frequency list was too small.
        if self.b2.contains(&key) {
            let delta = (self.b1.len() / self.b2.len()).max(1);
            self.p = self.p.saturating_sub(delta);
            self.replace(true);
            self.b2.pop(&key);
            self.t2.put(key, value);
            return;
        }

        // Entirely new key.
        let l1 = self.t1.len() + self.b1.len();
        if l1 == self.capacity {
            if self.t1.len() < self.capacity {
                self.b1.pop_lru();
                self.replace(false);
            } else {
                self.t1.pop_lru();
            }
        } else if l1 < self.capacity {
            let total = self.t1.len() + self.t2.len() + self.b1.len() + self.b2.len();
            if total >= self.capacity {
                if total == 2 * self.capacity {
                    self.b2.pop_lru();
                }
                self.replace(false);
            }
        }
        self.t1.put(key, value);
    }

    /// Evict one resident entry into its ghost list, steered by `p`.
    fn replace(&mut self, b2_hit: bool) {
        let t1_len = self.t1.len();
        if t1_len > 0 && (t1_len > self.p || (b2_hit && t1_len == self.p)) {
            if let Some((evicted, _)) = self.t1.pop_lru() {
                self.b1.put(evicted, ());
            }
        } else if let Some((evicted, _)) = self.t2.pop_lru() {
            self.b2.put(evicted, ());
        }
    }

    /// Number of entries currently holding values.
    pub fn len(&self) -> usize {
        self.t1.len() + self.t2.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
