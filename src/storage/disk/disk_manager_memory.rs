use parking_lot::RwLock;
use std::collections::HashMap;
use std::io::Result as IoResult;
use std::sync::atomic::{AtomicI32, Ordering};

use crate::common::config::{PageId, DB_PAGE_SIZE};
use crate::storage::disk::disk_manager::DiskIO;
use crate::storage::page::page::PageData;

/// DiskManagerMemory replicates the utility of the file-backed disk manager
/// in memory. It is primarily used for data structure testing.
pub struct DiskManagerMemory {
    data: RwLock<HashMap<PageId, Box<PageData>>>,
    num_writes: AtomicI32,
}

impl DiskManagerMemory {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            num_writes: AtomicI32::new(0),
        }
    }

    /// Retrieves the number of page writes performed.
    pub fn get_num_writes(&self) -> i32 {
        self.num_writes.load(Ordering::SeqCst)
    }
}

impl Default for DiskManagerMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskIO for DiskManagerMemory {
    fn write_page(&self, page_id: PageId, page_data: &PageData) -> IoResult<()> {
        let mut data = self.data.write();
        data.insert(page_id, Box::new(*page_data));
        self.num_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read_page(&self, page_id: PageId, page_data: &mut PageData) -> IoResult<()> {
        let data = self.data.read();
        match data.get(&page_id) {
            Some(stored) => page_data.copy_from_slice(&stored[..]),
            // Never-written pages read back as zeroes, like a sparse file.
            None => page_data.fill(0),
        }
        Ok(())
    }

    fn deallocate_page(&self, page_id: PageId) {
        self.data.write().remove(&page_id);
    }
}
