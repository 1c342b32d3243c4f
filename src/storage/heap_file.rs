use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use log::{debug, error, info};

use crate::buffer::error::{CacheError, CacheResult};
use crate::shared::page::{Page, PageId, PageRef, TableId, TransactionId, PAGE_SIZE};
use crate::shared::tuple::Tuple;

use super::heap_page::{self, HeapLayout};
use super::{DbFile, PageSource};

/// A table stored as a flat sequence of pages in one file
pub struct HeapFile {
    table_id: TableId,
    db_file: Mutex<File>,
    file_path: String,
    layout: HeapLayout,
}

impl HeapFile {
    pub fn open<P: AsRef<Path>>(db_path: P, table_id: TableId, tuple_size: usize) -> CacheResult<Self> {
        let file_path = match db_path.as_ref().to_str() {
            Some(path) => path.to_string(),
            None => {
                return Err(CacheError::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "Invalid file path",
                )))
            }
        };

        let db_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&db_path)?;

        info!("Opened heap file {} as table {}", file_path, table_id);

        Ok(Self {
            table_id,
            db_file: Mutex::new(db_file),
            file_path,
            layout: HeapLayout::new(tuple_size)?,
        })
    }

    pub fn get_file_path(&self) -> &str {
        &self.file_path
    }

    fn file(&self) -> CacheResult<MutexGuard<'_, File>> {
        self.db_file
            .lock()
            .map_err(|e| CacheError::LockPoisoned(e.to_string()))
    }

    fn page_id_to_offset(page_number: u32) -> u64 {
        page_number as u64 * PAGE_SIZE as u64
    }

    fn pages_in(file: &File) -> CacheResult<u32> {
        Ok((file.metadata()?.len() / PAGE_SIZE as u64) as u32)
    }

    /// Writes an empty page at the end of the file and returns its id
    fn append_page(&self) -> CacheResult<PageId> {
        let mut file = self.file()?;
        let page_number = Self::pages_in(&file)?;
        file.seek(SeekFrom::Start(Self::page_id_to_offset(page_number)))?;
        file.write_all(&[0u8; PAGE_SIZE])?;
        file.flush()?;
        Ok(PageId::new(self.table_id, page_number))
    }
}

impl DbFile for HeapFile {
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

        let mut file = self.file()?;
        if pid.page_number >= Self::pages_in(&file)? {
            return Err(CacheError::UnknownPage(pid));
        }

        let mut buffer = [0u8; PAGE_SIZE];
        file.seek(SeekFrom::Start(Self::page_id_to_offset(pid.page_number)))?;
        match file.read_exact(&mut buffer) {
            Ok(_) => Ok(Page::from_bytes(pid, &buffer)),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(CacheError::UnknownPage(pid)),
            Err(e) => {
                error!("Failed to read page {} from {}: {}", pid, self.file_path, e);
                Err(CacheError::Io(e))
            }
        }
    }

    fn write_page(&self, page: &Page) -> CacheResult<()> {
        let pid = page.get_page_id();
        if pid.table_id != self.table_id {
            return Err(CacheError::UnknownPage(pid));
        }

        let mut file = self.file()?;
        file.seek(SeekFrom::Start(Self::page_id_to_offset(pid.page_number)))?;
        file.write_all(page.get_data())?;
        file.flush()?;
        file.sync_data()?;

        debug!("Wrote page {} to {}", pid, self.file_path);
        Ok(())
    }

    fn num_pages(&self) -> CacheResult<u32> {
        let file = self.file()?;
        Self::pages_in(&file)
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
    use tempfile::tempdir;

    #[test]
    fn test_new_file_has_no_pages() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("table.dat");

        let heap_file = HeapFile::open(&path, 1, 8).unwrap();

        assert_eq!(heap_file.num_pages().unwrap(), 0);
        assert_eq!(heap_file.id(), 1);
        assert_eq!(heap_file.get_file_path(), path.to_str().unwrap());
    }

    #[test]
    fn test_read_unknown_page() {
        let dir = tempdir().unwrap();
        let heap_file = HeapFile::open(dir.path().join("table.dat"), 1, 8).unwrap();

        let result = heap_file.read_page(PageId::new(1, 100));
        assert!(matches!(result, Err(CacheError::UnknownPage(_))));

        let result = heap_file.read_page(PageId::new(2, 0));
        assert!(matches!(result, Err(CacheError::UnknownPage(_))));
    }

    #[test]
    fn test_write_and_read_page() {
        let dir = tempdir().unwrap();
        let heap_file = HeapFile::open(dir.path().join("table.dat"), 1, 8).unwrap();

        let pid = heap_file.append_page().unwrap();
        assert_eq!(pid, PageId::new(1, 0));

        let mut page = Page::new(pid);
        {
            let data = page.get_data_mut();
            data[0] = 123;
            data[1] = 45;
            data[PAGE_SIZE - 1] = 67;
        }
        heap_file.write_page(&page).unwrap();

        let read_page = heap_file.read_page(pid).unwrap();
        assert_eq!(read_page.get_data()[0], 123);
        assert_eq!(read_page.get_data()[1], 45);
        assert_eq!(read_page.get_data()[PAGE_SIZE - 1], 67);
        assert!(!read_page.is_dirty());
        assert_eq!(read_page.get_before_image()[0], 123);
    }

    #[test]
    fn test_file_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("table.dat");

        {
            let heap_file = HeapFile::open(&path, 4, 8).unwrap();
            heap_file.append_page().unwrap();
            let pid = heap_file.append_page().unwrap();
            let mut page = Page::new(pid);
            page.get_data_mut()[0] = 0xAB;
            heap_file.write_page(&page).unwrap();
        }

        let heap_file = HeapFile::open(&path, 4, 8).unwrap();
        assert_eq!(heap_file.num_pages().unwrap(), 2);
        let page = heap_file.read_page(PageId::new(4, 1)).unwrap();
        assert_eq!(page.get_data()[0], 0xAB);
    }
}
