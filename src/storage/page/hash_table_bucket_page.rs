use std::marker::PhantomData;

use crate::common::config::DB_PAGE_SIZE;
use crate::storage::index::comparators::KeyComparator;
use crate::storage::index::storable::Storable;

/// Bucket page for the extendible hash table, viewed over a page's bytes.
///
/// Layout: two bitmaps followed by the entry array.
/// ```text
/// ----------------------------------------------------------------
/// | occupied (C/8 bytes) | readable (C/8 bytes) | (key, value)*C |
/// ----------------------------------------------------------------
/// ```
/// `occupied` records that a slot has ever held an entry (a tombstone hint
/// for scans); `readable` records that it holds a live entry now. Capacity C
/// is derived from the page size and the encoded entry width so that the
/// array and both bitmaps fill one page.
pub struct HashTableBucketPage<D, K, V> {
    data: D,
    _marker: PhantomData<(K, V)>,
}

impl<D, K: Storable, V: Storable> HashTableBucketPage<D, K, V> {
    /// Number of `(key, value)` slots in one bucket page.
    pub const BUCKET_ARRAY_SIZE: usize =
        4 * DB_PAGE_SIZE / (4 * (K::ENCODED_LEN + V::ENCODED_LEN) + 1);

    const BITMAP_LEN: usize = (Self::BUCKET_ARRAY_SIZE + 7) / 8;
    const OFFSET_OCCUPIED: usize = 0;
    const OFFSET_READABLE: usize = Self::BITMAP_LEN;
    const OFFSET_ARRAY: usize = 2 * Self::BITMAP_LEN;
    const ENTRY_LEN: usize = K::ENCODED_LEN + V::ENCODED_LEN;

    fn entry_offset(bucket_idx: usize) -> usize {
        Self::OFFSET_ARRAY + bucket_idx * Self::ENTRY_LEN
    }
}

impl<D: AsRef<[u8]>, K: Storable, V: Storable + PartialEq> HashTableBucketPage<D, K, V> {
    pub fn new(data: D) -> Self {
        Self {
            data,
            _marker: PhantomData,
        }
    }

    fn test_bit(&self, offset: usize, bucket_idx: usize) -> bool {
        let byte = self.data.as_ref()[offset + bucket_idx / 8];
        byte & (1 << (bucket_idx % 8)) != 0
    }

    /// Returns whether the slot has ever been used.
    pub fn is_occupied(&self, bucket_idx: usize) -> bool {
        self.test_bit(Self::OFFSET_OCCUPIED, bucket_idx)
    }

    /// Returns whether the slot currently holds a live entry.
    pub fn is_readable(&self, bucket_idx: usize) -> bool {
        self.test_bit(Self::OFFSET_READABLE, bucket_idx)
    }

    pub fn key_at(&self, bucket_idx: usize) -> K {
        let offset = Self::entry_offset(bucket_idx);
        K::read_from(&self.data.as_ref()[offset..])
    }

    pub fn value_at(&self, bucket_idx: usize) -> V {
        let offset = Self::entry_offset(bucket_idx) + K::ENCODED_LEN;
        V::read_from(&self.data.as_ref()[offset..])
    }

    /// Collects the values of every live entry matching `key` into `result`.
    /// Returns whether anything matched.
    pub fn get_value<C: KeyComparator<K>>(&self, key: &K, cmp: &C, result: &mut Vec<V>) -> bool {
        let mut found = false;
        for i in 0..Self::BUCKET_ARRAY_SIZE {
            if self.is_readable(i) && cmp.is_equal(key, &self.key_at(i)) {
                result.push(self.value_at(i));
                found = true;
            }
        }
        found
    }

    /// Returns the number of live entries.
    pub fn num_readable(&self) -> usize {
        (0..Self::BUCKET_ARRAY_SIZE)
            .filter(|&i| self.is_readable(i))
            .count()
    }

    pub fn is_full(&self) -> bool {
        (0..Self::BUCKET_ARRAY_SIZE).all(|i| self.is_readable(i))
    }

    pub fn is_empty(&self) -> bool {
        (0..Self::BUCKET_ARRAY_SIZE).all(|i| !self.is_readable(i))
    }

    /// Snapshots the live entries, in slot order.
    pub fn get_all_entries(&self) -> Vec<(K, V)> {
        (0..Self::BUCKET_ARRAY_SIZE)
            .filter(|&i| self.is_readable(i))
            .map(|i| (self.key_at(i), self.value_at(i)))
            .collect()
    }
}

impl<D, K, V> HashTableBucketPage<D, K, V>
where
    D: AsRef<[u8]> + AsMut<[u8]>,
    K: Storable,
    V: Storable + PartialEq,
{
    fn set_bit(&mut self, offset: usize, bucket_idx: usize) {
        self.data.as_mut()[offset + bucket_idx / 8] |= 1 << (bucket_idx % 8);
    }

    fn clear_bit(&mut self, offset: usize, bucket_idx: usize) {
        self.data.as_mut()[offset + bucket_idx / 8] &= !(1 << (bucket_idx % 8));
    }

    fn set_occupied(&mut self, bucket_idx: usize) {
        self.set_bit(Self::OFFSET_OCCUPIED, bucket_idx);
    }

    fn set_readable(&mut self, bucket_idx: usize) {
        self.set_bit(Self::OFFSET_READABLE, bucket_idx);
    }

    /// Inserts `(key, value)` into the first free slot. Rejects an exact
    /// duplicate pair; duplicate keys with distinct values are permitted.
    /// Returns `false` when the pair exists already or the bucket is full.
    pub fn insert<C: KeyComparator<K>>(&mut self, key: &K, value: &V, cmp: &C) -> bool {
        let mut available = None;
        for i in 0..Self::BUCKET_ARRAY_SIZE {
            if self.is_readable(i) {
                if cmp.is_equal(key, &self.key_at(i)) && *value == self.value_at(i) {
                    return false;
                }
            } else if available.is_none() {
                available = Some(i);
            }
        }

        let slot = match available {
            Some(slot) => slot,
            None => return false,
        };

        let offset = Self::entry_offset(slot);
        key.write_to(&mut self.data.as_mut()[offset..]);
        value.write_to(&mut self.data.as_mut()[offset + K::ENCODED_LEN..]);
        self.set_occupied(slot);
        self.set_readable(slot);
        true
    }

    /// Removes the first live entry equal to `(key, value)`. The occupied bit
    /// stays set as a tombstone hint.
    pub fn remove<C: KeyComparator<K>>(&mut self, key: &K, value: &V, cmp: &C) -> bool {
        for i in 0..Self::BUCKET_ARRAY_SIZE {
            if self.is_readable(i)
                && cmp.is_equal(key, &self.key_at(i))
                && *value == self.value_at(i)
            {
                self.remove_at(i);
                return true;
            }
        }
        false
    }

    /// Clears the readable bit of a slot.
    pub fn remove_at(&mut self, bucket_idx: usize) {
        self.clear_bit(Self::OFFSET_READABLE, bucket_idx);
    }

    /// Zeroes the bitmaps and the entry array.
    pub fn reset(&mut self) {
        let end = Self::entry_offset(Self::BUCKET_ARRAY_SIZE);
        self.data.as_mut()[..end].fill(0);
    }
}
