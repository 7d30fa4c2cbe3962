use std::collections::HashMap;

use crate::common::config::{PageId, DIRECTORY_ARRAY_SIZE, MAX_GLOBAL_DEPTH};

const OFFSET_PAGE_ID: usize = 0;
const OFFSET_GLOBAL_DEPTH: usize = 4;
const OFFSET_BUCKET_PAGE_IDS: usize = 8;
const OFFSET_LOCAL_DEPTHS: usize = OFFSET_BUCKET_PAGE_IDS + 4 * DIRECTORY_ARRAY_SIZE;

/// Directory page for the extendible hash table, viewed over a page's bytes.
///
/// Directory format (size in bytes):
/// ```text
/// ---------------------------------------------------------------------------------
/// | PageId (4) | GlobalDepth (4) | BucketPageIds (512 * 4) | LocalDepths (512 * 1) |
/// ---------------------------------------------------------------------------------
/// ```
/// The active prefix of the arrays is `1 << global_depth` slots; entries `i`
/// and `j` point to the same bucket iff they agree on the low
/// `local_depth[i]` bits.
pub struct HashTableDirectoryPage<D> {
    data: D,
}

impl<D: AsRef<[u8]>> HashTableDirectoryPage<D> {
    pub fn new(data: D) -> Self {
        Self { data }
    }

    fn read_u32(&self, offset: usize) -> u32 {
        let bytes = &self.data.as_ref()[offset..offset + 4];
        u32::from_le_bytes(bytes.try_into().unwrap())
    }

    /// Returns the page ID of this page.
    pub fn get_page_id(&self) -> PageId {
        self.read_u32(OFFSET_PAGE_ID)
    }

    /// Returns the global depth of the hash table directory.
    pub fn get_global_depth(&self) -> u32 {
        self.read_u32(OFFSET_GLOBAL_DEPTH)
    }

    /// Returns the current directory size.
    pub fn size(&self) -> u32 {
        1 << self.get_global_depth()
    }

    /// Returns a mask of global depth 1's and the rest 0's.
    pub fn get_global_depth_mask(&self) -> u32 {
        (1 << self.get_global_depth()) - 1
    }

    /// Looks up the bucket page id stored at a directory index.
    pub fn get_bucket_page_id(&self, bucket_idx: u32) -> PageId {
        self.read_u32(OFFSET_BUCKET_PAGE_IDS + 4 * bucket_idx as usize)
    }

    /// Gets the local depth of the bucket at `bucket_idx`.
    pub fn get_local_depth(&self, bucket_idx: u32) -> u32 {
        self.data.as_ref()[OFFSET_LOCAL_DEPTHS + bucket_idx as usize] as u32
    }

    /// Returns a mask of local depth 1's and the rest 0's for the bucket at
    /// `bucket_idx`.
    pub fn get_local_depth_mask(&self, bucket_idx: u32) -> u32 {
        (1 << self.get_local_depth(bucket_idx)) - 1
    }

    /// Gets the split image of an index: the slot whose low bits differ from
    /// `bucket_idx` only in the local high bit.
    pub fn get_split_image_index(&self, bucket_idx: u32) -> u32 {
        bucket_idx ^ (1 << (self.get_local_depth(bucket_idx) - 1))
    }

    /// Returns `true` if the directory can halve: every active slot's local
    /// depth is strictly below the global depth.
    pub fn can_shrink(&self) -> bool {
        let global_depth = self.get_global_depth();
        if global_depth == 0 {
            return false;
        }
        (0..self.size()).all(|i| self.get_local_depth(i) < global_depth)
    }

    /// Asserts the directory invariants:
    /// - every active local depth is at most the global depth,
    /// - each bucket page is pointed to by exactly `2^(gd - ld)` slots,
    /// - all slots sharing a bucket page agree on its local depth.
    pub fn verify_integrity(&self) {
        let mut page_id_counts: HashMap<PageId, u32> = HashMap::new();
        let mut page_id_depths: HashMap<PageId, u32> = HashMap::new();
        let global_depth = self.get_global_depth();

        for i in 0..self.size() {
            let page_id = self.get_bucket_page_id(i);
            let local_depth = self.get_local_depth(i);
            assert!(
                local_depth <= global_depth,
                "local depth {} at slot {} exceeds global depth {}",
                local_depth,
                i,
                global_depth
            );

            *page_id_counts.entry(page_id).or_insert(0) += 1;
            match page_id_depths.get(&page_id) {
                Some(&depth) => assert_eq!(
                    depth, local_depth,
                    "slot {} disagrees on local depth of page {}",
                    i, page_id
                ),
                None => {
                    page_id_depths.insert(page_id, local_depth);
                }
            }
        }

        for (page_id, count) in page_id_counts {
            let local_depth = page_id_depths[&page_id];
            let expected = 1 << (global_depth - local_depth);
            assert_eq!(
                count, expected,
                "page {} is pointed to by {} slots, expected {}",
                page_id, count, expected
            );
        }
    }
}

impl<D: AsRef<[u8]> + AsMut<[u8]>> HashTableDirectoryPage<D> {
    fn write_u32(&mut self, offset: usize, value: u32) {
        self.data.as_mut()[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Sets the page ID of this page.
    pub fn set_page_id(&mut self, page_id: PageId) {
        self.write_u32(OFFSET_PAGE_ID, page_id);
    }

    /// Updates the directory slot at `bucket_idx` to point at `bucket_page_id`.
    pub fn set_bucket_page_id(&mut self, bucket_idx: u32, bucket_page_id: PageId) {
        self.write_u32(OFFSET_BUCKET_PAGE_IDS + 4 * bucket_idx as usize, bucket_page_id);
    }

    /// Sets the local depth of the bucket at `bucket_idx`.
    pub fn set_local_depth(&mut self, bucket_idx: u32, local_depth: u32) {
        debug_assert!(local_depth <= MAX_GLOBAL_DEPTH);
        self.data.as_mut()[OFFSET_LOCAL_DEPTHS + bucket_idx as usize] = local_depth as u8;
    }

    /// Increments the local depth of the bucket at `bucket_idx`.
    pub fn incr_local_depth(&mut self, bucket_idx: u32) {
        let depth = self.get_local_depth(bucket_idx);
        self.set_local_depth(bucket_idx, depth + 1);
    }

    /// Decrements the local depth of the bucket at `bucket_idx`.
    pub fn decr_local_depth(&mut self, bucket_idx: u32) {
        let depth = self.get_local_depth(bucket_idx);
        self.set_local_depth(bucket_idx, depth - 1);
    }

    /// Doubles the directory. The new upper half inherits the page ids and
    /// local depths of its low-order siblings.
    pub fn incr_global_depth(&mut self) {
        let global_depth = self.get_global_depth();
        assert!(global_depth < MAX_GLOBAL_DEPTH, "directory cannot grow past max depth");

        let size = 1u32 << global_depth;
        for i in 0..size {
            let page_id = self.get_bucket_page_id(i);
            let local_depth = self.get_local_depth(i);
            self.set_bucket_page_id(size + i, page_id);
            self.set_local_depth(size + i, local_depth);
        }
        self.write_u32(OFFSET_GLOBAL_DEPTH, global_depth + 1);
    }

    /// Halves the directory.
    pub fn decr_global_depth(&mut self) {
        let global_depth = self.get_global_depth();
        assert!(global_depth > 0, "directory cannot shrink below depth 0");
        self.write_u32(OFFSET_GLOBAL_DEPTH, global_depth - 1);
    }
}
