use log::{debug, warn};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Result as IoResult;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicI32, Ordering};

use crate::common::config::{PageId, DB_PAGE_SIZE};
use crate::storage::page::page::PageData;

/// The `DiskIO` trait defines the basic operations for interacting with disk
/// storage. Implementers of this trait must provide methods to write and read
/// pages. Both calls are synchronous; callers treat them as infallible for
/// valid page ids.
pub trait DiskIO: Send + Sync {
    fn write_page(&self, page_id: PageId, page_data: &PageData) -> IoResult<()>;
    fn read_page(&self, page_id: PageId, page_data: &mut PageData) -> IoResult<()>;

    /// Releases a page id on the disk side. The default implementation is a
    /// no-op; a real allocator would return the block to a free map.
    fn deallocate_page(&self, _page_id: PageId) {}
}

/// The `FileDiskManager` is responsible for managing disk I/O operations
/// against a single database file, addressed in fixed-size page blocks.
pub struct FileDiskManager {
    file_name: String,
    db_io: Mutex<File>,
    num_flushes: AtomicI32,
    num_writes: AtomicI32,
}

impl FileDiskManager {
    /// Creates a new instance of the `FileDiskManager`, opening (or creating)
    /// the database file.
    pub fn new(db_file: impl AsRef<Path>) -> IoResult<Self> {
        let path = db_file.as_ref();
        let db_io = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        Ok(Self {
            file_name: path.to_string_lossy().to_string(),
            db_io: Mutex::new(db_io),
            num_flushes: AtomicI32::new(0),
            num_writes: AtomicI32::new(0),
        })
    }

    /// Returns the path of the database file.
    pub fn get_file_name(&self) -> &str {
        &self.file_name
    }

    /// Retrieves the number of times data has been flushed to disk.
    pub fn get_num_flushes(&self) -> i32 {
        self.num_flushes.load(Ordering::SeqCst)
    }

    /// Retrieves the number of page writes performed by the disk manager.
    pub fn get_num_writes(&self) -> i32 {
        self.num_writes.load(Ordering::SeqCst)
    }
}

impl DiskIO for FileDiskManager {
    fn write_page(&self, page_id: PageId, page_data: &PageData) -> IoResult<()> {
        let offset = page_id as u64 * DB_PAGE_SIZE as u64;
        let mut db_io = self.db_io.lock();
        db_io.seek(SeekFrom::Start(offset))?;
        db_io.write_all(page_data)?;
        db_io.flush()?;

        self.num_writes.fetch_add(1, Ordering::SeqCst);
        self.num_flushes.fetch_add(1, Ordering::SeqCst);
        debug!("Wrote page {} at offset {}", page_id, offset);
        Ok(())
    }

    fn read_page(&self, page_id: PageId, page_data: &mut PageData) -> IoResult<()> {
        let offset = page_id as u64 * DB_PAGE_SIZE as u64;
        let mut db_io = self.db_io.lock();
        db_io.seek(SeekFrom::Start(offset))?;

        // A page past the end of the file has simply never been flushed.
        let mut bytes_read = 0;
        while bytes_read < DB_PAGE_SIZE {
            match db_io.read(&mut page_data[bytes_read..])? {
                0 => break,
                n => bytes_read += n,
            }
        }
        if bytes_read < DB_PAGE_SIZE {
            page_data[bytes_read..].fill(0);
            warn!(
                "Read of page {} hit EOF after {} bytes, zero-filled the rest",
                page_id, bytes_read
            );
        } else {
            debug!("Read page {} at offset {}", page_id, offset);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_read_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let dm = FileDiskManager::new(temp_dir.path().join("test.db")).unwrap();

        let mut data: PageData = [0; DB_PAGE_SIZE];
        data[0] = 1;
        data[DB_PAGE_SIZE - 1] = 2;
        dm.write_page(3, &data).unwrap();

        let mut out: PageData = [0xFF; DB_PAGE_SIZE];
        dm.read_page(3, &mut out).unwrap();
        assert_eq!(out[0], 1);
        assert_eq!(out[DB_PAGE_SIZE - 1], 2);
        assert_eq!(dm.get_num_writes(), 1);
    }

    #[test]
    fn test_read_unwritten_page_zero_fills() {
        let temp_dir = TempDir::new().unwrap();
        let dm = FileDiskManager::new(temp_dir.path().join("test.db")).unwrap();

        let mut out: PageData = [0xFF; DB_PAGE_SIZE];
        dm.read_page(9, &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 0));
    }
}
