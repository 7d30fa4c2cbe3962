use log::debug;
use parking_lot::{Mutex, RwLock};
use std::marker::PhantomData;
use std::sync::Arc;

use crate::buffer::buffer_pool_manager::BufferPoolManager;
use crate::common::config::{PageId, INVALID_PAGE_ID, MAX_BUCKET_DEPTH};
use crate::concurrency::transaction::Transaction;
use crate::container::hash_function::HashFunction;
use crate::storage::index::comparators::KeyComparator;
use crate::storage::index::storable::Storable;
use crate::storage::page::hash_table_bucket_page::HashTableBucketPage;
use crate::storage::page::hash_table_directory_page::HashTableDirectoryPage;
use crate::storage::page::page_guard::PageGuard;

/// Implementation of an extendible hash table backed by a buffer pool manager.
/// Non-unique keys are supported. The table grows by directory doubling and
/// bucket splitting as buckets fill, and shrinks by merging empty buckets
/// with their split images.
///
/// Latching discipline: search, insert and remove take the table latch in
/// read mode and latch the touched bucket page; splits and merges take the
/// table latch in write mode, which excludes all other operations. Pages are
/// pinned before they are latched, and every pin is released by the guard
/// with the dirty flag reflecting whether the page was mutated.
pub struct ExtendibleHashTable<K, V, C> {
    bpm: Arc<BufferPoolManager>,
    comparator: C,
    hash_fn: HashFunction<K>,
    /// Directory page id, lazily created. The mutex serializes the bootstrap
    /// so racing first operations create exactly one directory.
    directory_page_id: Mutex<PageId>,
    table_latch: RwLock<()>,
    _value_marker: PhantomData<V>,
}

impl<K, V, C> ExtendibleHashTable<K, V, C>
where
    K: Storable,
    V: Storable + PartialEq,
    C: KeyComparator<K>,
{
    /// Creates a new `ExtendibleHashTable`. The directory page is allocated
    /// on the first operation, not here.
    pub fn new(bpm: Arc<BufferPoolManager>, comparator: C, hash_fn: HashFunction<K>) -> Self {
        Self {
            bpm,
            comparator,
            hash_fn,
            directory_page_id: Mutex::new(INVALID_PAGE_ID),
            table_latch: RwLock::new(()),
            _value_marker: PhantomData,
        }
    }

    /// Downcast of the hash function's 64-bit digest for directory addressing.
    fn hash(&self, key: &K) -> u32 {
        self.hash_fn.get_hash(key) as u32
    }

    /// Fetches the directory page, creating the directory and its first
    /// bucket on the very first call.
    fn fetch_directory_page(&self) -> PageGuard {
        {
            let mut directory_page_id = self.directory_page_id.lock();
            if *directory_page_id == INVALID_PAGE_ID {
                let dir_guard = self
                    .bpm
                    .new_page_guarded()
                    .expect("failed to allocate directory page");
                let bucket_guard = self
                    .bpm
                    .new_page_guarded()
                    .expect("failed to allocate initial bucket page");
                {
                    let mut dir_data = dir_guard.write();
                    let mut dir = HashTableDirectoryPage::new(&mut dir_data[..]);
                    dir.set_page_id(dir_guard.get_page_id());
                    dir.set_bucket_page_id(0, bucket_guard.get_page_id());
                }
                dir_guard.set_dirty();
                bucket_guard.set_dirty();
                *directory_page_id = dir_guard.get_page_id();
                debug!(
                    "Bootstrapped directory page {} with bucket page {}",
                    dir_guard.get_page_id(),
                    bucket_guard.get_page_id()
                );
            }
        }

        let directory_page_id = *self.directory_page_id.lock();
        self.bpm
            .fetch_page_guarded(directory_page_id)
            .expect("directory page must be fetchable")
    }

    fn fetch_bucket_page(&self, bucket_page_id: PageId) -> PageGuard {
        self.bpm
            .fetch_page_guarded(bucket_page_id)
            .expect("bucket page must be fetchable")
    }

    /// Collects every value stored under `key`. Returns whether any matched.
    pub fn get_value(
        &self,
        key: &K,
        result: &mut Vec<V>,
        _transaction: Option<&Transaction>,
    ) -> bool {
        let _table = self.table_latch.read();
        let dir_guard = self.fetch_directory_page();
        let bucket_page_id = {
            let dir_data = dir_guard.read();
            let dir = HashTableDirectoryPage::new(&dir_data[..]);
            dir.get_bucket_page_id(self.hash(key) & dir.get_global_depth_mask())
        };

        let bucket_guard = self.fetch_bucket_page(bucket_page_id);
        let bucket_data = bucket_guard.read();
        let bucket = HashTableBucketPage::<_, K, V>::new(&bucket_data[..]);
        bucket.get_value(key, &self.comparator, result)
    }

    /// Inserts `(key, value)`. Returns `false` when the exact pair is already
    /// present, or when the target bucket cannot be split any further.
    pub fn insert(&self, key: &K, value: &V, transaction: Option<&Transaction>) -> bool {
        {
            let _table = self.table_latch.read();
            let dir_guard = self.fetch_directory_page();
            let bucket_page_id = {
                let dir_data = dir_guard.read();
                let dir = HashTableDirectoryPage::new(&dir_data[..]);
                dir.get_bucket_page_id(self.hash(key) & dir.get_global_depth_mask())
            };

            let bucket_guard = self.fetch_bucket_page(bucket_page_id);
            let mut bucket_data = bucket_guard.write();
            let mut bucket = HashTableBucketPage::<_, K, V>::new(&mut bucket_data[..]);
            if !bucket.is_full() {
                let inserted = bucket.insert(key, value, &self.comparator);
                if inserted {
                    bucket_guard.set_dirty();
                }
                return inserted;
            }
            // Bucket is full; fall through with everything released and
            // retry under the table write latch.
        }
        self.split_insert(key, value, transaction)
    }

    /// Splits the bucket `key` maps to, then retries the insert.
    fn split_insert(&self, key: &K, value: &V, transaction: Option<&Transaction>) -> bool {
        {
            let _table = self.table_latch.write();
            let dir_guard = self.fetch_directory_page();
            let mut dir_data = dir_guard.write();
            let mut dir = HashTableDirectoryPage::new(&mut dir_data[..]);

            let split_idx = self.hash(key) & dir.get_global_depth_mask();
            let split_depth = dir.get_local_depth(split_idx);

            // The partition is as fine as it is allowed to get.
            if split_depth >= MAX_BUCKET_DEPTH {
                return false;
            }

            if split_depth == dir.get_global_depth() {
                dir.incr_global_depth();
            }
            dir.incr_local_depth(split_idx);

            let split_page_id = dir.get_bucket_page_id(split_idx);
            let split_guard = self.fetch_bucket_page(split_page_id);
            let mut split_data = split_guard.write();
            let mut split_bucket = HashTableBucketPage::<_, K, V>::new(&mut split_data[..]);
            let entries = split_bucket.get_all_entries();
            split_bucket.reset();

            let image_guard = self
                .bpm
                .new_page_guarded()
                .expect("failed to allocate image bucket page");
            let image_page_id = image_guard.get_page_id();
            let mut image_data = image_guard.write();
            let mut image_bucket = HashTableBucketPage::<_, K, V>::new(&mut image_data[..]);

            let new_depth = dir.get_local_depth(split_idx);
            let image_idx = split_idx ^ (1 << (new_depth - 1));

            // Rewrite each slot of the affected partition exactly once: slots
            // agreeing with the split index on the low new_depth bits keep
            // the old bucket, slots agreeing with the image index get the
            // new one. Both halves move to the new local depth.
            let mask = (1u32 << new_depth) - 1;
            for i in 0..dir.size() {
                if i & mask == split_idx & mask {
                    dir.set_bucket_page_id(i, split_page_id);
                    dir.set_local_depth(i, new_depth);
                } else if i & mask == image_idx & mask {
                    dir.set_bucket_page_id(i, image_page_id);
                    dir.set_local_depth(i, new_depth);
                }
            }

            for (entry_key, entry_value) in entries {
                let target_idx = self.hash(&entry_key) & mask;
                let target_page_id = dir.get_bucket_page_id(target_idx);
                debug_assert!(
                    target_page_id == split_page_id || target_page_id == image_page_id
                );
                let reinserted = if target_page_id == split_page_id {
                    split_bucket.insert(&entry_key, &entry_value, &self.comparator)
                } else {
                    image_bucket.insert(&entry_key, &entry_value, &self.comparator)
                };
                assert!(reinserted, "redistribution must not overflow a bucket");
            }

            dir_guard.set_dirty();
            split_guard.set_dirty();
            image_guard.set_dirty();
            debug!(
                "Split bucket page {} into image page {} at local depth {}",
                split_page_id, image_page_id, new_depth
            );
        }
        // The key's partition has room now, or splits again on the retry.
        self.insert(key, value, transaction)
    }

    /// Removes the exact `(key, value)` pair. An emptied bucket is merged
    /// with its split image afterwards.
    pub fn remove(&self, key: &K, value: &V, transaction: Option<&Transaction>) -> bool {
        let (removed, empty, bucket_idx) = {
            let _table = self.table_latch.read();
            let dir_guard = self.fetch_directory_page();
            let (bucket_idx, bucket_page_id) = {
                let dir_data = dir_guard.read();
                let dir = HashTableDirectoryPage::new(&dir_data[..]);
                let bucket_idx = self.hash(key) & dir.get_global_depth_mask();
                (bucket_idx, dir.get_bucket_page_id(bucket_idx))
            };

            let bucket_guard = self.fetch_bucket_page(bucket_page_id);
            let mut bucket_data = bucket_guard.write();
            let mut bucket = HashTableBucketPage::<_, K, V>::new(&mut bucket_data[..]);
            let removed = bucket.remove(key, value, &self.comparator);
            if removed {
                bucket_guard.set_dirty();
            }
            (removed, bucket.is_empty(), bucket_idx)
        };

        if empty {
            self.merge(bucket_idx, transaction);
        }
        removed
    }

    /// Merges the (empty) bucket at `target_bucket_index` into its split
    /// image and shrinks the directory while it can. A merge quietly aborts
    /// if the picture changed between the remove and this call.
    fn merge(&self, target_bucket_index: u32, _transaction: Option<&Transaction>) {
        let _table = self.table_latch.write();
        let dir_guard = self.fetch_directory_page();
        let mut dir_data = dir_guard.write();
        let mut dir = HashTableDirectoryPage::new(&mut dir_data[..]);

        // A concurrent shrink may have invalidated the index.
        if target_bucket_index >= dir.size() {
            return;
        }

        let local_depth = dir.get_local_depth(target_bucket_index);
        if local_depth == 0 {
            return;
        }

        // Only buckets whose split image sits at the same depth can merge.
        let image_bucket_index = dir.get_split_image_index(target_bucket_index);
        if local_depth != dir.get_local_depth(image_bucket_index) {
            return;
        }

        let target_page_id = dir.get_bucket_page_id(target_bucket_index);

        // Re-check emptiness under the bucket latch; the table write latch
        // excludes all mutators.
        {
            let target_guard = self.fetch_bucket_page(target_page_id);
            let target_data = target_guard.read();
            let target_bucket = HashTableBucketPage::<_, K, V>::new(&target_data[..]);
            if !target_bucket.is_empty() {
                return;
            }
        }

        assert!(
            self.bpm.delete_page(target_page_id),
            "empty bucket page must be deletable"
        );

        let image_page_id = dir.get_bucket_page_id(image_bucket_index);
        dir.set_bucket_page_id(target_bucket_index, image_page_id);
        dir.decr_local_depth(target_bucket_index);
        dir.decr_local_depth(image_bucket_index);

        let merged_depth = dir.get_local_depth(target_bucket_index);
        for i in 0..dir.size() {
            let page_id = dir.get_bucket_page_id(i);
            if page_id == target_page_id || page_id == image_page_id {
                dir.set_bucket_page_id(i, image_page_id);
                dir.set_local_depth(i, merged_depth);
            }
        }

        while dir.can_shrink() {
            dir.decr_global_depth();
        }

        dir_guard.set_dirty();
        debug!(
            "Merged bucket page {} into page {}, global depth now {}",
            target_page_id,
            image_page_id,
            dir.get_global_depth()
        );
    }

    /// Returns the directory's global depth.
    pub fn get_global_depth(&self) -> u32 {
        let _table = self.table_latch.read();
        let dir_guard = self.fetch_directory_page();
        let dir_data = dir_guard.read();
        HashTableDirectoryPage::new(&dir_data[..]).get_global_depth()
    }

    /// Asserts the directory invariants.
    pub fn verify_integrity(&self) {
        let _table = self.table_latch.read();
        let dir_guard = self.fetch_directory_page();
        let dir_data = dir_guard.read();
        HashTableDirectoryPage::new(&dir_data[..]).verify_integrity();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::logger::initialize_logger;
    use crate::common::rid::RID;
    use crate::storage::disk::disk_manager_memory::DiskManagerMemory;
    use crate::storage::index::comparators::IntComparator;

    fn test_table(
        pool_size: usize,
        hash_fn: HashFunction<i32>,
    ) -> ExtendibleHashTable<i32, RID, IntComparator> {
        initialize_logger();
        let disk_manager = Arc::new(DiskManagerMemory::new());
        let bpm = Arc::new(BufferPoolManager::new(pool_size, disk_manager));
        ExtendibleHashTable::new(bpm, IntComparator::new(), hash_fn)
    }

    #[test]
    fn test_insert_and_get() {
        let ht = test_table(10, HashFunction::new());

        for i in 0..10 {
            assert!(ht.insert(&i, &RID::new(i as u32, 0), None));
        }

        for i in 0..10 {
            let mut result = vec![];
            assert!(ht.get_value(&i, &mut result, None));
            assert_eq!(result, vec![RID::new(i as u32, 0)]);
        }

        let mut result = vec![];
        assert!(!ht.get_value(&99, &mut result, None));
        assert!(result.is_empty());
        ht.verify_integrity();
    }

    #[test]
    fn test_duplicate_pair_rejected() {
        let ht = test_table(10, HashFunction::new());

        assert!(ht.insert(&1, &RID::new(1, 0), None));
        assert!(!ht.insert(&1, &RID::new(1, 0), None));
        // same key, different value is fine
        assert!(ht.insert(&1, &RID::new(1, 1), None));

        let mut result = vec![];
        assert!(ht.get_value(&1, &mut result, None));
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_remove() {
        let ht = test_table(10, HashFunction::new());

        assert!(ht.insert(&1, &RID::new(1, 0), None));
        assert!(ht.remove(&1, &RID::new(1, 0), None));
        assert!(!ht.remove(&1, &RID::new(1, 0), None));

        let mut result = vec![];
        assert!(!ht.get_value(&1, &mut result, None));
    }

    #[test]
    fn test_split_grows_directory() {
        // Identity hashing makes bucket targeting deterministic.
        let ht = test_table(16, HashFunction::with_raw(|k| *k as u64));
        let capacity =
            HashTableBucketPage::<&[u8], i32, RID>::BUCKET_ARRAY_SIZE as i32;

        // Keys sharing their low three bits overfill one bucket; the first
        // splits produce empty images until depth reaches the first bit that
        // distinguishes them.
        let keys: Vec<i32> = (0..=capacity).map(|i| i * 8).collect();
        for (i, &k) in keys.iter().enumerate() {
            assert!(ht.insert(&k, &RID::new(i as u32, 0), None), "insert of key {} failed", k);
        }
        assert!(ht.get_global_depth() >= 3);
        ht.verify_integrity();

        for (i, &k) in keys.iter().enumerate() {
            let mut result = vec![];
            assert!(ht.get_value(&k, &mut result, None));
            assert_eq!(result, vec![RID::new(i as u32, 0)]);
        }
    }

    #[test]
    fn test_remove_all_shrinks_directory() {
        let ht = test_table(16, HashFunction::with_raw(|k| *k as u64));
        let capacity =
            HashTableBucketPage::<&[u8], i32, RID>::BUCKET_ARRAY_SIZE as i32;

        // Enough sequential keys to force at least one split.
        let keys: Vec<i32> = (0..capacity + 66).collect();
        for &k in &keys {
            assert!(ht.insert(&k, &RID::new(k as u32, 0), None));
        }
        assert!(ht.get_global_depth() > 0);
        ht.verify_integrity();

        for &k in &keys {
            assert!(ht.remove(&k, &RID::new(k as u32, 0), None));
        }
        assert_eq!(ht.get_global_depth(), 0);
        ht.verify_integrity();
    }
}
