use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use std::cell::Cell;
use std::sync::Arc;

use crate::buffer::buffer_pool_manager::BufferPoolManager;
use crate::common::config::PageId;
use crate::storage::page::page::{Page, PageData};

/// A scoped pin on a buffer pool page.
///
/// The guard represents a borrow-with-a-pin: it is created with the pin the
/// buffer pool took in `fetch_page`/`new_page` and releases exactly that pin
/// when dropped, passing along the dirty flag accumulated through
/// [`PageGuard::set_dirty`]. Latching stays explicit: [`PageGuard::read`] and
/// [`PageGuard::write`] take the page latch, and the latch guard must be
/// dropped before this guard (drop order does this naturally in a block).
pub struct PageGuard {
    bpm: Arc<BufferPoolManager>,
    page: Arc<Page>,
    page_id: PageId,
    is_dirty: Cell<bool>,
}

impl PageGuard {
    pub(crate) fn new(bpm: Arc<BufferPoolManager>, page: Arc<Page>) -> Self {
        let page_id = page.get_page_id();
        Self {
            bpm,
            page,
            page_id,
            is_dirty: Cell::new(false),
        }
    }

    pub fn get_page_id(&self) -> PageId {
        self.page_id
    }

    /// Latches the page in read mode.
    pub fn read(&self) -> RwLockReadGuard<'_, Box<PageData>> {
        self.page.rlatch()
    }

    /// Latches the page in write mode.
    pub fn write(&self) -> RwLockWriteGuard<'_, Box<PageData>> {
        self.page.wlatch()
    }

    /// Records that the caller mutated the page; the drop-time unpin will
    /// carry the dirty flag.
    pub fn set_dirty(&self) {
        self.is_dirty.set(true);
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        self.bpm.unpin_page(self.page_id, self.is_dirty.get());
    }
}
