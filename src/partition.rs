//! Routing of intermediate keys to reduce buckets.
//!
//! Map and reduce run in different processes at different times, so the
//! bucket of a key must be a pure function of the key bytes and the bucket
//! count. FNV-1a has no per-process seed (unlike the std `RandomState`), which
//! keeps it identical across workers and restarts.

use std::hash::Hasher;

use anyhow::{ensure, Result};

use crate::KeyValue;

/// Hashes an intermediate key. Compute a reduce bucket for a given key
/// by calculating `ihash(key) % n_reduce`.
pub fn ihash(key: &[u8]) -> u32 {
    let mut hasher = fnv::FnvHasher::default();
    hasher.write(key);
    (hasher.finish() & 0x7fff_ffff) as u32
}

/// The reduce bucket in `[0, n_reduce)` that owns `key`.
///
/// `n_reduce` must be positive.
#[inline]
pub fn bucket_for(key: &[u8], n_reduce: u32) -> u32 {
    debug_assert!(n_reduce > 0);
    ihash(key) % n_reduce
}

/// Intermediate pairs of one map unit, split by reduce bucket.
///
/// Pairs keep the order in which the map function emitted them.
#[derive(Debug)]
pub struct Buckets {
    buckets: Vec<Vec<KeyValue>>,
}

impl Buckets {
    pub fn new(n_reduce: u32) -> Result<Self> {
        ensure!(n_reduce > 0, "reduce bucket count must be positive");
        Ok(Self {
            buckets: vec![Vec::new(); n_reduce as usize],
        })
    }

    pub fn n_reduce(&self) -> u32 {
        self.buckets.len() as u32
    }

    /// Route a pair to its bucket.
    pub fn push(&mut self, kv: KeyValue) {
        let bucket = bucket_for(&kv.key, self.n_reduce());
        self.buckets[bucket as usize].push(kv);
    }

    pub fn get(&self, bucket: u32) -> &[KeyValue] {
        &self.buckets[bucket as usize]
    }

    /// Consume the buckets, yielding `(bucket index, pairs)` for every bucket
    /// that received at least one pair, in bucket order.
    pub fn into_non_empty(self) -> impl Iterator<Item = (u32, Vec<KeyValue>)> {
        self.buckets
            .into_iter()
            .enumerate()
            .filter(|(_, kvs)| !kvs.is_empty())
            .map(|(index, kvs)| (index as u32, kvs))
    }
}

impl Extend<KeyValue> for Buckets {
    fn extend<T: IntoIterator<Item = KeyValue>>(&mut self, iter: T) {
        for kv in iter {
            self.push(kv);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ihash_matches_fnv1a_reference_values() {
        // FNV-1a 64 of "" is 0xcbf29ce484222325 and of "a" is 0xaf63dc4c8601ec8c.
        assert_eq!(ihash(b""), 0x0422_2325);
        assert_eq!(ihash(b"a"), 0x0601_ec8c);
    }

    #[test]
    fn ihash_is_non_negative_as_i32() {
        for word in ["alpha", "beta", "gamma", "delta", "", "zzzzzzzzzzzz"] {
            assert!(ihash(word.as_bytes()) <= i32::MAX as u32);
        }
    }

    #[test]
    fn single_bucket_takes_every_key() {
        for word in ["a", "b", "c", "the", "quick", "brown", "fox"] {
            assert_eq!(bucket_for(word.as_bytes(), 1), 0);
        }
    }

    #[test]
    fn buckets_stay_in_range_and_spread() {
        let n_reduce = 7;
        let mut seen = vec![0usize; n_reduce as usize];
        for i in 0..1000 {
            let key = format!("key-{i}");
            let bucket = bucket_for(key.as_bytes(), n_reduce);
            assert!(bucket < n_reduce);
            seen[bucket as usize] += 1;
        }
        assert!(seen.iter().all(|&count| count > 0), "{seen:?}");
    }

    #[test]
    fn equal_keys_land_in_one_bucket() {
        let mut buckets = Buckets::new(4).unwrap();
        buckets.extend([
            KeyValue::new("apple", "1"),
            KeyValue::new("pear", "1"),
            KeyValue::new("apple", "2"),
        ]);

        let home = bucket_for(b"apple", 4);
        let apples: Vec<_> = buckets
            .get(home)
            .iter()
            .filter(|kv| kv.key.as_ref() == b"apple")
            .map(|kv| kv.value.clone())
            .collect();
        assert_eq!(apples, vec!["1", "2"]);

        let total: usize = buckets.into_non_empty().map(|(_, kvs)| kvs.len()).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn zero_buckets_is_rejected() {
        assert!(Buckets::new(0).is_err());
    }
}
