use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};

use crate::common::config::{PageId, DB_PAGE_SIZE, INVALID_PAGE_ID};

/// The raw byte buffer held by a page.
pub type PageData = [u8; DB_PAGE_SIZE];

/// Page is the basic unit of storage within the database system. Page provides
/// a wrapper for actual data pages being held in main memory. Page also
/// contains book-keeping information that is used by the buffer pool manager,
/// e.g. pin count, dirty flag, page id, etc.
///
/// The byte buffer sits behind a reader/writer lock which doubles as the
/// page's latch: [`Page::rlatch`] admits concurrent readers,
/// [`Page::wlatch`] admits one writer. The metadata fields are owned by the
/// buffer pool and only mutated under its latch; they are atomics so that
/// accessors never contend with the page latch.
pub struct Page {
    /// The ID of the page this frame currently holds.
    page_id: AtomicU32,
    /// The pin count of this page.
    pin_count: AtomicI32,
    /// True if the page has been modified since it was read from disk.
    is_dirty: AtomicBool,
    /// The actual data that is stored within a page.
    data: RwLock<Box<PageData>>,
}

impl Page {
    /// Constructor. Zeros out the page data and marks the frame empty.
    pub fn new() -> Self {
        Page {
            page_id: AtomicU32::new(INVALID_PAGE_ID),
            pin_count: AtomicI32::new(0),
            is_dirty: AtomicBool::new(false),
            data: RwLock::new(Box::new([0; DB_PAGE_SIZE])),
        }
    }

    /// Returns the page id of this page.
    pub fn get_page_id(&self) -> PageId {
        self.page_id.load(Ordering::SeqCst)
    }

    /// Returns the pin count of this page.
    pub fn get_pin_count(&self) -> i32 {
        self.pin_count.load(Ordering::SeqCst)
    }

    /// Returns true if the page is dirty.
    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::SeqCst)
    }

    /// Acquires the page latch in read mode.
    pub fn rlatch(&self) -> RwLockReadGuard<'_, Box<PageData>> {
        self.data.read()
    }

    /// Acquires the page latch in write mode.
    pub fn wlatch(&self) -> RwLockWriteGuard<'_, Box<PageData>> {
        self.data.write()
    }

    pub(crate) fn set_page_id(&self, page_id: PageId) {
        self.page_id.store(page_id, Ordering::SeqCst);
    }

    pub(crate) fn set_pin_count(&self, pin_count: i32) {
        self.pin_count.store(pin_count, Ordering::SeqCst);
    }

    pub(crate) fn incr_pin_count(&self) {
        self.pin_count.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn decr_pin_count(&self) {
        self.pin_count.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn set_dirty(&self, is_dirty: bool) {
        self.is_dirty.store(is_dirty, Ordering::SeqCst);
    }

    /// Zeroes out the data that is held within the page.
    pub(crate) fn reset_memory(&self) {
        self.data.write().fill(0);
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}
