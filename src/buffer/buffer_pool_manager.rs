use log::{debug, error, warn};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::buffer::lru_replacer::LruReplacer;
use crate::common::config::{FrameId, PageId, INVALID_PAGE_ID};
use crate::storage::disk::disk_manager::DiskIO;
use crate::storage::page::page::Page;
use crate::storage::page::page_guard::PageGuard;

/// BufferPoolManager caches disk pages in a fixed set of in-memory frames,
/// pins pages for callers, and evicts unpinned frames in LRU order.
///
/// The frame table, free list and allocator counter live behind one coarse
/// latch held for the entire body of every public operation; disk reads and
/// writes happen under it as well, which keeps the page lifecycle simple at
/// the cost of cross-page concurrency. Callers must never invoke a buffer
/// pool operation while holding a latch on the affected page.
pub struct BufferPoolManager {
    /// Number of frames in the pool.
    pool_size: usize,
    /// How many buffer pool instances share the page id space.
    num_instances: u32,
    /// Index of this instance; every page id allocated here is congruent to
    /// it modulo `num_instances`.
    instance_index: u32,
    /// The frames. A frame holds at most one resident page.
    pages: Vec<Arc<Page>>,
    /// Victim selection among unpinned frames.
    replacer: LruReplacer,
    disk_manager: Arc<dyn DiskIO>,
    latch: Mutex<BufferPoolInner>,
}

struct BufferPoolInner {
    /// Mapping of resident page ids to the frames holding them.
    page_table: HashMap<PageId, FrameId>,
    /// Frames holding no page at all.
    free_list: VecDeque<FrameId>,
    /// Monotonic allocator cursor, stepped by `num_instances`.
    next_page_id: PageId,
}

impl BufferPoolManager {
    /// Creates a single-instance buffer pool of `pool_size` frames.
    pub fn new(pool_size: usize, disk_manager: Arc<dyn DiskIO>) -> Self {
        Self::new_parallel(pool_size, 1, 0, disk_manager)
    }

    /// Creates one shard of a parallel buffer pool. Page ids allocated by this
    /// instance satisfy `page_id % num_instances == instance_index`.
    pub fn new_parallel(
        pool_size: usize,
        num_instances: u32,
        instance_index: u32,
        disk_manager: Arc<dyn DiskIO>,
    ) -> Self {
        assert!(num_instances > 0, "a buffer pool needs at least one instance");
        assert!(
            instance_index < num_instances,
            "instance index must be smaller than the number of instances"
        );

        let pages = (0..pool_size).map(|_| Arc::new(Page::new())).collect();
        // Initially, every frame is in the free list.
        let free_list = (0..pool_size).collect();

        Self {
            pool_size,
            num_instances,
            instance_index,
            pages,
            replacer: LruReplacer::new(pool_size),
            disk_manager,
            latch: Mutex::new(BufferPoolInner {
                page_table: HashMap::new(),
                free_list,
                next_page_id: instance_index as PageId,
            }),
        }
    }

    pub fn get_pool_size(&self) -> usize {
        self.pool_size
    }

    /// Create a new page in the buffer pool, pinned once. Returns `None` if
    /// every frame is pinned.
    ///
    /// The replacement frame comes from the free list first, then from the
    /// replacer. A reused frame with a dirty page is written back before the
    /// frame is handed over.
    pub fn new_page(&self) -> Option<Arc<Page>> {
        let mut inner = self.latch.lock();

        let frame_id = self.take_victim_frame(&mut inner)?;

        let new_page_id = self.allocate_page(&mut inner);
        let page = &self.pages[frame_id];
        page.set_page_id(new_page_id);
        page.set_pin_count(1);
        page.set_dirty(false);
        page.reset_memory();

        inner.page_table.insert(new_page_id, frame_id);
        self.replacer.pin(frame_id);
        debug!("Created page {} in frame {}", new_page_id, frame_id);

        Some(Arc::clone(page))
    }

    /// Fetch the requested page, pinning it. Returns `None` if the page is not
    /// resident and every frame is pinned.
    pub fn fetch_page(&self, page_id: PageId) -> Option<Arc<Page>> {
        let mut inner = self.latch.lock();

        // Already resident: just pin it.
        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            let page = &self.pages[frame_id];
            page.incr_pin_count();
            self.replacer.pin(frame_id);
            return Some(Arc::clone(page));
        }

        let frame_id = self.take_victim_frame(&mut inner)?;

        let page = &self.pages[frame_id];
        page.set_page_id(page_id);
        page.set_pin_count(1);
        page.set_dirty(false);
        {
            let mut data = page.wlatch();
            if let Err(e) = self.disk_manager.read_page(page_id, &mut data) {
                error!("Failed to read page {} from disk: {}", page_id, e);
            }
        }

        inner.page_table.insert(page_id, frame_id);
        self.replacer.pin(frame_id);
        debug!("Fetched page {} into frame {}", page_id, frame_id);

        Some(Arc::clone(page))
    }

    /// Unpin a page, recording whether the caller mutated it. Fails if the
    /// page is not resident or its pin count is already zero.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let inner = self.latch.lock();

        let frame_id = match inner.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return false,
        };

        let page = &self.pages[frame_id];
        if page.get_pin_count() <= 0 {
            warn!("Unbalanced unpin of page {}", page_id);
            return false;
        }

        page.decr_pin_count();
        // The dirty bit only accumulates; a clean unpin never clears it.
        if is_dirty {
            page.set_dirty(true);
        }
        if page.get_pin_count() == 0 {
            self.replacer.unpin(frame_id);
        }
        true
    }

    /// Delete a page from the pool and deallocate it on disk. Returns `false`
    /// only when the page is resident and still pinned.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        let mut inner = self.latch.lock();
        self.disk_manager.deallocate_page(page_id);

        let frame_id = match inner.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return true,
        };

        let page = &self.pages[frame_id];
        if page.get_pin_count() > 0 {
            return false;
        }

        if page.is_dirty() {
            let data = page.rlatch();
            if let Err(e) = self.disk_manager.write_page(page_id, &data) {
                error!("Failed to write page {} to disk: {}", page_id, e);
            }
        }

        self.replacer.pin(frame_id);
        inner.page_table.remove(&page_id);
        page.set_dirty(false);
        page.set_pin_count(0);
        page.set_page_id(INVALID_PAGE_ID);
        page.reset_memory();
        inner.free_list.push_back(frame_id);
        debug!("Deleted page {}, frame {} returned to free list", page_id, frame_id);

        true
    }

    /// Write a page's bytes to disk and clear its dirty bit. Fails on an
    /// invalid or non-resident page id.
    pub fn flush_page(&self, page_id: PageId) -> bool {
        let inner = self.latch.lock();

        if page_id == INVALID_PAGE_ID {
            return false;
        }
        let frame_id = match inner.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return false,
        };

        let page = &self.pages[frame_id];
        {
            let data = page.rlatch();
            if let Err(e) = self.disk_manager.write_page(page_id, &data) {
                error!("Failed to flush page {} to disk: {}", page_id, e);
                return false;
            }
        }
        page.set_dirty(false);
        true
    }

    /// Write every resident dirty page to disk.
    pub fn flush_all_pages(&self) {
        let inner = self.latch.lock();

        for (&page_id, &frame_id) in inner.page_table.iter() {
            let page = &self.pages[frame_id];
            if !page.is_dirty() {
                continue;
            }
            let data = page.rlatch();
            if let Err(e) = self.disk_manager.write_page(page_id, &data) {
                error!("Failed to flush page {} to disk: {}", page_id, e);
                continue;
            }
            drop(data);
            page.set_dirty(false);
        }
    }

    /// Create a new page wrapped in a scoped pin guard.
    pub fn new_page_guarded(self: &Arc<Self>) -> Option<PageGuard> {
        let page = self.new_page()?;
        Some(PageGuard::new(Arc::clone(self), page))
    }

    /// Fetch a page wrapped in a scoped pin guard.
    pub fn fetch_page_guarded(self: &Arc<Self>, page_id: PageId) -> Option<PageGuard> {
        let page = self.fetch_page(page_id)?;
        Some(PageGuard::new(Arc::clone(self), page))
    }

    /// Picks a replacement frame: free list first, then the replacer. A frame
    /// reclaimed from the replacer has its old page written back if dirty and
    /// its page table mapping erased. `None` means every frame is pinned.
    fn take_victim_frame(&self, inner: &mut BufferPoolInner) -> Option<FrameId> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Some(frame_id);
        }

        let frame_id = self.replacer.victim()?;
        let page = &self.pages[frame_id];
        let old_page_id = page.get_page_id();
        if page.is_dirty() {
            let data = page.rlatch();
            if let Err(e) = self.disk_manager.write_page(old_page_id, &data) {
                error!("Failed to write page {} to disk: {}", old_page_id, e);
            }
        }
        inner.page_table.remove(&old_page_id);
        Some(frame_id)
    }

    /// Hands out the next page id owned by this instance (pre-increment).
    fn allocate_page(&self, inner: &mut BufferPoolInner) -> PageId {
        let next_page_id = inner.next_page_id;
        inner.next_page_id += self.num_instances;
        self.validate_page_id(next_page_id);
        next_page_id
    }

    fn validate_page_id(&self, page_id: PageId) {
        // Allocated pages must map back to this instance.
        assert_eq!(page_id % self.num_instances, self.instance_index);
    }
}
