use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use xxhash_rust::xxh3::Xxh3;

/// Represents a hash function for a given key type, producing 64-bit digests
/// that the hash table truncates to 32 bits for directory addressing.
pub struct HashFunction<K> {
    hasher: fn(&K) -> u64,
    _marker: PhantomData<K>,
}

impl<K: Hash> HashFunction<K> {
    /// Creates the default `HashFunction`, backed by xxh3.
    pub fn new() -> Self {
        Self {
            hasher: Self::xxh3_hash,
            _marker: PhantomData,
        }
    }

    fn xxh3_hash(key: &K) -> u64 {
        let mut hasher = Xxh3::new();
        key.hash(&mut hasher);
        hasher.finish()
    }
}

impl<K> HashFunction<K> {
    /// Creates a `HashFunction` over a raw hashing routine. Tests use this to
    /// inject deterministic digests and steer keys into chosen buckets.
    pub fn with_raw(hasher: fn(&K) -> u64) -> Self {
        Self {
            hasher,
            _marker: PhantomData,
        }
    }

    /// Returns the hash value of the given key.
    pub fn get_hash(&self, key: &K) -> u64 {
        (self.hasher)(key)
    }
}

impl<K: Hash> Default for HashFunction<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Clone for HashFunction<K> {
    fn clone(&self) -> Self {
        Self {
            hasher: self.hasher,
            _marker: PhantomData,
        }
    }
}
