use std::sync::Arc;
use tempfile::tempdir;

use crate::buffer::error::CacheError;
use crate::buffer::PageCache;
use crate::shared::page::{PageId, Permissions, TransactionId};
use crate::shared::tuple::Tuple;
use crate::storage::{scan, DbFile, HeapFile, MemoryFile};
use crate::wal::{LogOperation, WriteAheadLog};

use super::RecordingLog;

fn tuple(byte: u8, size: usize) -> Tuple {
    Tuple::new(vec![byte; size])
}

#[test]
fn test_committed_tuples_survive_restart() {
    let dir = tempdir().unwrap();
    let table_path = dir.path().join("people.tbl");
    let wal_path = dir.path().join("people.wal");

    let t1 = TransactionId::new();
    {
        let wal = WriteAheadLog::new(&wal_path).unwrap();
        let cache = PageCache::with_capacity(8, wal);
        let file = Arc::new(HeapFile::open(&table_path, 1, 32).unwrap());
        cache.register_file(file.clone()).unwrap();

        for n in 0..5 {
            cache.insert_tuple(t1, 1, &tuple(n, 32)).unwrap();
        }
        cache.complete(t1, true).unwrap();
        assert!(!cache.holds(t1, PageId::new(1, 0)).unwrap());
    }

    let wal = WriteAheadLog::new(&wal_path).unwrap();
    let records = wal.read_all().unwrap();
    assert_eq!(records.len(), 2);
    assert!(matches!(records[0].operation, LogOperation::Update { tid, .. } if tid == t1));
    assert_eq!(records[1].operation, LogOperation::Commit { tid: t1 });

    let cache = PageCache::with_capacity(8, wal);
    let file = Arc::new(HeapFile::open(&table_path, 1, 32).unwrap());
    cache.register_file(file.clone()).unwrap();

    let t2 = TransactionId::new();
    let tuples = scan(&cache, t2, &*file).unwrap();
    let bytes: Vec<u8> = tuples.iter().map(|t| t.data()[0]).collect();
    assert_eq!(bytes, vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_aborted_inserts_never_reach_disk() {
    let dir = tempdir().unwrap();
    let table_path = dir.path().join("orders.tbl");
    let wal = WriteAheadLog::new(dir.path().join("orders.wal")).unwrap();
    let cache = PageCache::with_capacity(8, wal);
    let file = Arc::new(HeapFile::open(&table_path, 2, 64).unwrap());
    cache.register_file(file.clone()).unwrap();

    let t1 = TransactionId::new();
    cache.insert_tuple(t1, 2, &tuple(9, 64)).unwrap();
    cache.complete(t1, false).unwrap();

    // the appended page exists but holds nothing
    let on_disk = file.read_page(PageId::new(2, 0)).unwrap();
    assert!(on_disk.get_data().iter().all(|b| *b == 0));

    let t2 = TransactionId::new();
    assert!(scan(&cache, t2, &*file).unwrap().is_empty());
}

#[test]
fn test_commit_writes_every_dirtied_page() {
    let cache = PageCache::with_capacity(8, RecordingLog::default());
    // three 1 KiB tuples per page
    let file = Arc::new(MemoryFile::new(3, 1024).unwrap());
    cache.register_file(file.clone()).unwrap();

    let t1 = TransactionId::new();
    for n in 0..7 {
        cache.insert_tuple(t1, 3, &tuple(n, 1024)).unwrap();
    }
    assert_eq!(file.num_pages().unwrap(), 3);
    assert_eq!(file.write_count(), 0);

    cache.complete(t1, true).unwrap();

    assert_eq!(file.write_count(), 3);
    for n in 0..3 {
        let pid = PageId::new(3, n);
        assert!(!cache.holds(t1, pid).unwrap());
        let page = cache.fetch(TransactionId::new(), pid, Permissions::ReadOnly).unwrap();
        assert_eq!(page.read().unwrap().get_data()[..], file.page_bytes(n).unwrap()[..]);
    }
}

#[test]
fn test_abort_restores_every_dirtied_page() {
    let cache = PageCache::with_capacity(8, RecordingLog::default());
    let file = Arc::new(MemoryFile::new(4, 1024).unwrap());
    cache.register_file(file.clone()).unwrap();

    let setup = TransactionId::new();
    for n in 0..4 {
        cache.insert_tuple(setup, 4, &tuple(n, 1024)).unwrap();
    }
    cache.complete(setup, true).unwrap();
    let before: Vec<Vec<u8>> = (0..2).map(|n| file.page_bytes(n).unwrap()).collect();

    let t1 = TransactionId::new();
    let existing = scan(&cache, t1, &*file).unwrap();
    for victim in &existing {
        cache.delete_tuple(t1, victim).unwrap();
    }
    cache.insert_tuple(t1, 4, &tuple(50, 1024)).unwrap();
    cache.complete(t1, false).unwrap();

    let t2 = TransactionId::new();
    for n in 0..2 {
        let page = cache.fetch(t2, PageId::new(4, n), Permissions::ReadOnly).unwrap();
        assert_eq!(page.read().unwrap().get_data()[..], before[n as usize][..]);
    }
    assert_eq!(scan(&cache, t2, &*file).unwrap().len(), 4);
}

#[test]
fn test_mutation_fails_when_all_pages_dirty() {
    let cache = PageCache::with_capacity(1, RecordingLog::default());
    let file = Arc::new(MemoryFile::new(5, 1024).unwrap());
    cache.register_file(file.clone()).unwrap();

    let t1 = TransactionId::new();
    for n in 0..3 {
        cache.insert_tuple(t1, 5, &tuple(n, 1024)).unwrap();
    }

    // page 0 is full and dirty; the fourth tuple needs a second page
    let result = cache.insert_tuple(t1, 5, &tuple(3, 1024));
    assert!(matches!(result, Err(CacheError::NoCleanPage)));
    assert_eq!(cache.resident_count().unwrap(), 1);
    assert!(cache.is_resident(PageId::new(5, 0)).unwrap());

    // once committed the page is clean and can make room
    cache.complete(t1, true).unwrap();
    let t2 = TransactionId::new();
    cache.insert_tuple(t2, 5, &tuple(3, 1024)).unwrap();
    assert!(cache.is_resident(PageId::new(5, 1)).unwrap());
}

#[test]
fn test_rejects_wrong_tuple_size() {
    let cache = PageCache::with_capacity(4, RecordingLog::default());
    let file = Arc::new(MemoryFile::new(6, 8).unwrap());
    cache.register_file(file).unwrap();

    let result = cache.insert_tuple(TransactionId::new(), 6, &tuple(1, 9));
    assert!(matches!(result, Err(CacheError::InvalidTuple(_))));
}

#[test]
fn test_delete_twice_reports_missing_tuple() {
    let cache = PageCache::with_capacity(4, RecordingLog::default());
    let file = Arc::new(MemoryFile::new(8, 8).unwrap());
    cache.register_file(file.clone()).unwrap();

    let t1 = TransactionId::new();
    cache.insert_tuple(t1, 8, &tuple(1, 8)).unwrap();
    let stored = scan(&cache, t1, &*file).unwrap().remove(0);

    cache.delete_tuple(t1, &stored).unwrap();
    let result = cache.delete_tuple(t1, &stored);
    assert!(matches!(result, Err(CacheError::TupleNotFound(_))));
}
