pub mod heap_file;
pub mod heap_page;
pub mod memory;

use log::debug;

use crate::buffer::error::{CacheError, CacheResult};
use crate::shared::page::{Page, PageId, PageRef, Permissions, TableId, TransactionId};
use crate::shared::tuple::Tuple;

use self::heap_page::HeapLayout;

pub use self::heap_file::HeapFile;
pub use self::memory::MemoryFile;

/// Something that hands out pages under a transaction's lock. The page cache
/// is the implementation; storage files use it to fetch the pages they mutate.
pub trait PageSource {
    fn fetch(&self, tid: TransactionId, pid: PageId, perm: Permissions) -> CacheResult<PageRef>;
}

/// A table's backing store, as seen by the page cache.
///
/// `insert_tuple` and `delete_tuple` obtain their pages through `source` in
/// write mode and return every page they modified. They do not mark pages
/// dirty; the cache does that when it installs them.
pub trait DbFile: Send + Sync {
    fn id(&self) -> TableId;

    fn tuple_size(&self) -> usize;

    fn read_page(&self, pid: PageId) -> CacheResult<Page>;

    fn write_page(&self, page: &Page) -> CacheResult<()>;

    fn num_pages(&self) -> CacheResult<u32>;

    fn insert_tuple(
        &self,
        source: &dyn PageSource,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> CacheResult<Vec<PageRef>>;

    fn delete_tuple(
        &self,
        source: &dyn PageSource,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> CacheResult<Vec<PageRef>>;
}

/// Reads every live tuple of `file`, taking a shared lock on each page
pub fn scan(source: &dyn PageSource, tid: TransactionId, file: &dyn DbFile) -> CacheResult<Vec<Tuple>> {
    let layout = HeapLayout::new(file.tuple_size())?;
    let num_pages = file.num_pages()?;
    let mut tuples = Vec::new();

    for page_number in 0..num_pages {
        let pid = PageId::new(file.id(), page_number);
        let page = source.fetch(tid, pid, Permissions::ReadOnly)?;
        let guard = page
            .read()
            .map_err(|e| CacheError::LockPoisoned(e.to_string()))?;
        tuples.extend(layout.tuples(pid, guard.get_data()));
    }

    debug!("Scanned {} tuples from table {} for {}", tuples.len(), file.id(), tid);
    Ok(tuples)
}
