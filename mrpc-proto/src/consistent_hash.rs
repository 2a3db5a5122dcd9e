//! Consistent-hash ring with cyclic wraparound lookup.
//!
//! Each registered entry contributes `uniform_factor` virtual replicas,
//! placed by iteratively hashing the entry's key (`k_{i+1} = hash32(k_i, word
//! of k_i)`). Buckets are selected by the top `order` bits of a replica's
//! key; within a bucket, replicas are kept sorted ascending by key.

use crate::hash::hash32;

const HASH_SEED: u32 = 0;

#[derive(Debug, Clone)]
struct Replica<V> {
    key: u32,
    value: V,
}

/// `order` in `[0, 20]`; bucket count is `2^order`. `uniform_factor` in
/// `[1, 255]`; each entry gets that many virtual replicas.
pub struct ConsistentHashRing<V> {
    order: u32,
    uniform_factor: u8,
    buckets: Vec<Vec<Replica<V>>>,
    len: usize,
}

impl<V: Clone> ConsistentHashRing<V> {
    /// # Panics
    /// Panics if `order > 20` or `uniform_factor == 0`.
    #[must_use]
    pub fn new(order: u32, uniform_factor: u8) -> Self {
        assert!(order <= 20, "consistent hash order must be in [0, 20]");
        assert!(uniform_factor > 0, "uniform factor must be in [1, 255]");
        let bucket_count = 1usize << order;
        Self {
            order,
            uniform_factor,
            buckets: vec![Vec::new(); bucket_count],
            len: 0,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    fn bucket_of(&self, key: u32) -> usize {
        if self.order == 0 {
            0
        } else {
            (key >> (32 - self.order)) as usize
        }
    }

    /// The iterated replica-key sequence for `key`: `k_0 = key`,
    /// `k_{i+1} = hash32(k_i, k_i)`.
    fn replica_keys(key: u32, count: u8) -> Vec<u32> {
        let mut keys = Vec::with_capacity(count as usize);
        let mut k = key;
        for _ in 0..count {
            keys.push(k);
            k = hash32(k, &[k]);
        }
        keys
    }

    /// Registers `value` under `key`, inserting `uniform_factor` replicas.
    pub fn add_entry(&mut self, key: u32, value: V) {
        for replica_key in Self::replica_keys(key, self.uniform_factor) {
            let bucket = self.bucket_of(replica_key);
            let entries = &mut self.buckets[bucket];
            let pos = entries.partition_point(|e| e.key < replica_key);
            entries.insert(
                pos,
                Replica {
                    key: replica_key,
                    value: value.clone(),
                },
            );
        }
        self.len += 1;
    }

    /// Removes every replica previously inserted for `key`.
    ///
    /// # Panics
    /// Panics (debug-only) if a replica is missing, which would indicate
    /// `key` was never added or the ring was corrupted.
    pub fn remove_entry(&mut self, key: u32) {
        for replica_key in Self::replica_keys(key, self.uniform_factor) {
            let bucket = self.bucket_of(replica_key);
            let entries = &mut self.buckets[bucket];
            let idx = entries.iter().position(|e| e.key == replica_key);
            match idx {
                Some(i) => {
                    entries.remove(i);
                }
                None => debug_assert!(false, "removing a replica that was never added"),
            }
        }
        self.len = self.len.saturating_sub(1);
    }

    pub fn remove_all_entries(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.len = 0;
    }

    /// Finds the value owning `query`: the smallest replica key >= `query`
    /// in `query`'s bucket, else the first replica of the next non-empty
    /// bucket going forward cyclically (every later bucket holds strictly
    /// larger keys, so its first entry is always the answer once `query`'s
    /// own bucket misses — this also covers wraparound past the last
    /// bucket, since the scan is cyclic over all buckets in one pass).
    ///
    /// Returns `None` iff the ring is empty.
    #[must_use]
    pub fn get_entry(&self, query: u32) -> Option<&V> {
        if self.len == 0 {
            return None;
        }

        let start_bucket = self.bucket_of(query);
        let bucket_count = self.buckets.len();
        for offset in 0..bucket_count {
            let b = (start_bucket + offset) % bucket_count;
            let entries = &self.buckets[b];
            if entries.is_empty() {
                continue;
            }
            let threshold = if offset == 0 { query } else { 0 };
            let pos = entries.partition_point(|e| e.key < threshold);
            if pos < entries.len() {
                return Some(&entries[pos].value);
            }
            // offset==0 miss: every entry in query's own bucket has key <
            // query. Keep scanning forward; the next non-empty bucket's
            // first entry is the answer.
        }
        unreachable!("non-empty ring must yield an entry across one full bucket scan")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_returns_registered_value() {
        let mut ring: ConsistentHashRing<u32> = ConsistentHashRing::new(8, 10);
        ring.add_entry(1, 100);
        ring.add_entry(2, 200);
        ring.add_entry(3, 300);

        for q in [0u32, 12345, u32::MAX, 777_777] {
            let v = *ring.get_entry(q).unwrap();
            assert!([100, 200, 300].contains(&v));
        }
    }

    #[test]
    fn add_then_remove_restores_emptiness() {
        let mut ring: ConsistentHashRing<u32> = ConsistentHashRing::new(8, 10);
        assert!(ring.is_empty());
        ring.add_entry(42, 1);
        assert_eq!(ring.len(), 1);
        ring.remove_entry(42);
        assert!(ring.is_empty());
        assert!(ring.get_entry(0).is_none());
    }

    #[test]
    fn remove_all_clears_every_bucket() {
        let mut ring: ConsistentHashRing<u32> = ConsistentHashRing::new(4, 5);
        for k in 0..10 {
            ring.add_entry(k, k);
        }
        ring.remove_all_entries();
        assert!(ring.is_empty());
        assert!(ring.get_entry(5).is_none());
    }

    #[test]
    fn reasonably_uniform_with_many_keys() {
        let mut ring: ConsistentHashRing<u32> = ConsistentHashRing::new(8, 10);
        for k in 0..4u32 {
            ring.add_entry(k, k);
        }
        let mut counts = [0u32; 4];
        for q in 0..4000u32 {
            let v = *ring.get_entry(hash32(q, &[q])).unwrap();
            counts[v as usize] += 1;
        }
        for c in counts {
            assert!(c > 0, "every entry should receive some traffic");
        }
    }
}
