use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use log::trace;

use crate::buffer::error::{CacheError, CacheResult};
use crate::shared::page::{Page, PageId, PageRef, TableId, TransactionId, PAGE_SIZE};
use crate::shared::tuple::Tuple;

use super::heap_page::{self, HeapLayout};
use super::{DbFile, PageSource};

/// Heap file kept entirely in memory. Counts page writes so callers can
/// check what reached "disk".
pub struct MemoryFile {
    table_id: TableId,
    pages: Mutex<Vec<Box<[u8; PAGE_SIZE]>>>,
    layout: HeapLayout,
    writes: AtomicUsize,
}

impl MemoryFile {
    pub fn new(table_id: TableId, tuple_size: usize) -> CacheResult<Self> {
        Self::with_pages(table_id, tuple_size, 0)
    }

    /// A file pre-populated with `num_pages` empty pages
    pub fn with_pages(table_id: TableId, tuple_size: usize, num_pages: u32) -> CacheResult<Self> {
        let pages = (0..num_pages).map(|_| Box::new([0u8; PAGE_SIZE])).collect();
        Ok(Self {
            table_id,
            pages: Mutex::new(pages),
            layout: HeapLayout::new(tuple_size)?,
            writes: AtomicUsize::new(0),
        })
    }

    fn pages(&self) -> CacheResult<MutexGuard<'_, Vec<Box<[u8; PAGE_SIZE]>>>> {
        self.pages
            .lock()
            .map_err(|e| CacheError::LockPoisoned(e.to_string()))
    }

    /// Number of `write_page` calls so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Stored bytes of a page, bypassing any cache
    pub fn page_bytes(&self, page_number: u32) -> CacheResult<Vec<u8>> {
        let pages = self.pages()?;
        pages
            .get(page_number as usize)
            .map(|data| data.to_vec())
            .ok_or(CacheError::UnknownPage(PageId::new(self.table_id, page_number)))
    }

    fn append_page(&self) -> CacheResult<PageId> {
        let mut pages = self.pages()?;
        pages.push(Box::new([0u8; PAGE_SIZE]));
        Ok(PageId::new(self.table_id, (pages.len() - 1) as u32))
    }
}

impl DbFile for MemoryFile {
    fn id(&self) -> TableId {
        self.table_id
    }

    fn tuple_size(&self) -> usize {
        self.layout.tuple_size()
    }

    fn read_page(&self, pid: PageId) -> CacheResult<Page> {
        if pid.table_id != self.table_id {
            return Err(CacheError::UnknownPage(pid));
        }
        let pages = self.pages()?;
        let data = pages
            .get(pid.page_number as usize)
            .ok_or(CacheError::UnknownPage(pid))?;
        Ok(Page::from_bytes(pid, &data[..]))
    }

    fn write_page(&self, page: &Page) -> CacheResult<()> {
        let pid = page.get_page_id();
        if pid.table_id != self.table_id {
            return Err(CacheError::UnknownPage(pid));
        }
        let mut pages = self.pages()?;
        let data = pages
            .get_mut(pid.page_number as usize)
            .ok_or(CacheError::UnknownPage(pid))?;
        data.copy_from_slice(&page.get_data()[..]);
        self.writes.fetch_add(1, Ordering::SeqCst);
        trace!("Stored page {} in memory", pid);
        Ok(())
    }

    fn num_pages(&self) -> CacheResult<u32> {
        Ok(self.pages()?.len() as u32)
    }

    fn insert_tuple(
        &self,
        source: &dyn PageSource,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> CacheResult<Vec<PageRef>> {
        let num_pages = self.num_pages()?;
        heap_page::insert_tuple(&self.layout, self.table_id, num_pages, source, tid, tuple, || {
            self.append_page()
        })
    }

    fn delete_tuple(
        &self,
        source: &dyn PageSource,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> CacheResult<Vec<PageRef>> {
        heap_page::delete_tuple(&self.layout, self.table_id, source, tid, tuple)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_pages() {
        let file = MemoryFile::with_pages(2, 8, 3).unwrap();
        assert_eq!(file.num_pages().unwrap(), 3);
        assert_eq!(file.page_bytes(2).unwrap(), vec![0u8; PAGE_SIZE]);
        assert!(matches!(file.page_bytes(3), Err(CacheError::UnknownPage(_))));
    }

    #[test]
    fn test_write_counts_and_persists() {
        let file = MemoryFile::with_pages(2, 8, 1).unwrap();
        let pid = PageId::new(2, 0);

        let mut page = file.read_page(pid).unwrap();
        page.get_data_mut()[5] = 77;
        file.write_page(&page).unwrap();

        assert_eq!(file.write_count(), 1);
        assert_eq!(file.read_page(pid).unwrap().get_data()[5], 77);
    }

    #[test]
    fn test_unknown_pages() {
        let file = MemoryFile::new(2, 8).unwrap();
        assert!(matches!(
            file.read_page(PageId::new(2, 0)),
            Err(CacheError::UnknownPage(_))
        ));
        assert!(matches!(
            file.write_page(&Page::new(PageId::new(9, 0))),
            Err(CacheError::UnknownPage(_))
        ));
    }
}
