pub mod buffer;
pub mod lock;
pub mod logger;
pub mod shared;
pub mod storage;
pub mod wal;

#[cfg(test)]
mod tests;

pub use buffer::config::CacheConfig;
pub use buffer::error::{CacheError, CacheResult};
pub use buffer::PageCache;
pub use lock::{LockManager, LockMode};
pub use shared::page::{PageId, Permissions, TransactionId, PAGE_SIZE};
pub use shared::tuple::{RecordId, Tuple};
pub use storage::{scan, DbFile, HeapFile, MemoryFile, PageSource};
pub use wal::{LogSink, WriteAheadLog};
