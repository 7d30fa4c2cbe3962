mod common;

use rand::Rng;
use std::sync::Arc;
use tempfile::TempDir;

use keeldb::buffer::buffer_pool_manager::BufferPoolManager;
use keeldb::common::config::DB_PAGE_SIZE;
use keeldb::storage::disk::disk_manager::FileDiskManager;
use keeldb::storage::disk::disk_manager_memory::DiskManagerMemory;

struct TestContext {
    bpm: Arc<BufferPoolManager>,
    _temp_dir: TempDir,
}

impl TestContext {
    fn new(pool_size: usize) -> Self {
        common::initialize_logger();
        let temp_dir = TempDir::new().unwrap();
        let disk_manager =
            Arc::new(FileDiskManager::new(temp_dir.path().join("test.db")).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(pool_size, disk_manager));
        Self {
            bpm,
            _temp_dir: temp_dir,
        }
    }
}

#[test]
fn binary_data_test() {
    let ctx = TestContext::new(5);
    let bpm = &ctx.bpm;

    // Scenario: the buffer pool is empty. We should be able to create a new page.
    let page0 = bpm.new_page().expect("failed to create a new page");
    let page0_id = page0.get_page_id();

    // Generate random binary data, with zero bytes in the middle and at the end.
    let mut rng = rand::thread_rng();
    let mut random_binary_data = [0u8; DB_PAGE_SIZE];
    rng.fill(&mut random_binary_data[..]);
    random_binary_data[DB_PAGE_SIZE / 2] = 0;
    random_binary_data[DB_PAGE_SIZE - 1] = 0;

    // Scenario: once we have a page, we should be able to read and write content.
    page0.wlatch().copy_from_slice(&random_binary_data);
    assert_eq!(&page0.rlatch()[..], &random_binary_data[..]);

    // Scenario: we should be able to create new pages until we fill up the pool.
    for _ in 1..5 {
        assert!(bpm.new_page().is_some());
    }

    // Scenario: the pool is full of pinned pages; no new page can be created.
    for _ in 0..5 {
        assert!(bpm.new_page().is_none());
    }

    // Scenario: after unpinning pages {0..4} and creating new pages, page 0's
    // frame gets evicted and its bytes land on disk.
    for page_id in 0..5 {
        assert!(bpm.unpin_page(page_id, true));
    }
    for _ in 0..5 {
        assert!(bpm.new_page().is_some());
    }

    // Scenario: fetching page 0 again reads the very bytes written earlier.
    for page_id in 5..10 {
        assert!(bpm.unpin_page(page_id, false));
    }
    let page0 = bpm.fetch_page(page0_id).expect("failed to fetch page 0");
    assert_eq!(&page0.rlatch()[..], &random_binary_data[..]);
    assert!(bpm.unpin_page(page0_id, false));
}

#[test]
fn new_page_eviction_test() {
    // Pool of 3 frames; pinned pages block creation, one unpin unblocks it.
    let ctx = TestContext::new(3);
    let bpm = &ctx.bpm;

    let mut page_ids = vec![];
    for _ in 0..3 {
        let page = bpm.new_page().expect("pool has free frames");
        page_ids.push(page.get_page_id());
    }
    assert_eq!(page_ids, vec![0, 1, 2]);

    // All three frames pinned: a fourth page cannot be created.
    assert!(bpm.new_page().is_none());

    // Unpinning one page frees its frame for reuse.
    assert!(bpm.unpin_page(0, false));
    let page3 = bpm.new_page().expect("an evictable frame exists now");
    assert_eq!(page3.get_page_id(), 3);

    // Page 0 is gone from the pool; page 1 is still resident and pinned.
    assert!(bpm.new_page().is_none());
    let page1 = bpm.fetch_page(1).expect("page 1 is resident");
    assert_eq!(page1.get_page_id(), 1);
    assert_eq!(page1.get_pin_count(), 2);
}

#[test]
fn unpin_balance_test() {
    let ctx = TestContext::new(3);
    let bpm = &ctx.bpm;

    let page = bpm.new_page().unwrap();
    let page_id = page.get_page_id();
    assert_eq!(page.get_pin_count(), 1);

    // Fetching a resident page stacks another pin.
    let again = bpm.fetch_page(page_id).unwrap();
    assert_eq!(again.get_pin_count(), 2);

    assert!(bpm.unpin_page(page_id, false));
    assert!(bpm.unpin_page(page_id, true));
    // The pin count is balanced; a further unpin fails.
    assert!(!bpm.unpin_page(page_id, false));
    // Unpinning a page that was never fetched fails too.
    assert!(!bpm.unpin_page(999, false));
}

#[test]
fn delete_page_test() {
    common::initialize_logger();
    let disk_manager = Arc::new(DiskManagerMemory::new());
    let bpm = BufferPoolManager::new(3, Arc::clone(&disk_manager) as Arc<dyn keeldb::storage::disk::disk_manager::DiskIO>);

    let page = bpm.new_page().unwrap();
    let page_id = page.get_page_id();
    page.wlatch()[0] = 42;

    // Deleting a pinned page fails.
    assert!(!bpm.delete_page(page_id));

    // The delete path flushes the dirty page directly: exactly one write.
    assert!(bpm.unpin_page(page_id, true));
    assert!(bpm.delete_page(page_id));
    assert_eq!(disk_manager.get_num_writes(), 1);

    // The frame rejoined the free list, so three fresh pages fit again.
    for _ in 0..3 {
        assert!(bpm.new_page().is_some());
    }

    // Deleting a page that is not resident still succeeds.
    assert!(bpm.delete_page(777));
}

#[test]
fn flush_page_test() {
    let ctx = TestContext::new(3);
    let bpm = &ctx.bpm;

    let page = bpm.new_page().unwrap();
    let page_id = page.get_page_id();
    page.wlatch()[7] = 7;
    assert!(bpm.unpin_page(page_id, true));

    assert!(bpm.flush_page(page_id));
    assert!(!page.is_dirty());

    // Flushing something that is not resident fails.
    assert!(!bpm.flush_page(999));

    bpm.flush_all_pages();
}

#[test]
fn parallel_instance_allocation_test() {
    common::initialize_logger();
    let disk_manager = Arc::new(DiskManagerMemory::new());
    // Instance 3 of 5 owns every page id congruent to 3 mod 5.
    let bpm = BufferPoolManager::new_parallel(10, 5, 3, disk_manager);

    let mut page_ids = vec![];
    for _ in 0..4 {
        let page = bpm.new_page().unwrap();
        page_ids.push(page.get_page_id());
    }
    assert_eq!(page_ids, vec![3, 8, 13, 18]);
    for page_id in page_ids {
        assert_eq!(page_id % 5, 3);
    }
}

#[test]
fn page_guard_test() {
    let ctx = TestContext::new(3);
    let bpm = &ctx.bpm;

    let page_id = {
        let guard = bpm.new_page_guarded().unwrap();
        guard.write()[0] = 99;
        guard.set_dirty();
        guard.get_page_id()
    };
    // The guard dropped its pin, so the page is evictable and deletable.
    {
        let guard = bpm.fetch_page_guarded(page_id).unwrap();
        assert_eq!(guard.read()[0], 99);
    }
    assert!(bpm.delete_page(page_id));
}
