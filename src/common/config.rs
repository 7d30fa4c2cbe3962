pub const DB_PAGE_SIZE: usize = 4096; // size of a data page in bytes
pub const BUFFER_POOL_SIZE: usize = 10; // default size of the buffer pool

pub const INVALID_PAGE_ID: PageId = u32::MAX; // invalid page id
pub const INVALID_TXN_ID: TxnId = u64::MAX; // invalid transaction id

/// Number of low-order hash bits the directory can grow to use.
pub const MAX_GLOBAL_DEPTH: u32 = 9;
/// Upper bound on any bucket's local depth. Must not exceed [`MAX_GLOBAL_DEPTH`].
pub const MAX_BUCKET_DEPTH: u32 = 9;
/// Number of directory slots persisted in a directory page (1 << MAX_GLOBAL_DEPTH).
pub const DIRECTORY_ARRAY_SIZE: usize = 1 << MAX_GLOBAL_DEPTH;

pub type FrameId = usize; // frame id type
pub type PageId = u32; // page id type
pub type TxnId = u64; // transaction id type
