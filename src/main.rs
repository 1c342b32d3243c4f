use std::path::PathBuf;
use std::sync::Arc;

use log::{error, info};

use rusty_txn::{logger, scan, CacheConfig, HeapFile, PageCache, Tuple, TransactionId, WriteAheadLog};

const TABLE: u32 = 1;
const TUPLE_SIZE: usize = 32;

fn record(text: &str) -> Tuple {
    let mut data = vec![0u8; TUPLE_SIZE];
    let len = text.len().min(TUPLE_SIZE);
    data[..len].copy_from_slice(&text.as_bytes()[..len]);
    Tuple::new(data)
}

fn show(cache: &PageCache, file: &HeapFile) -> rusty_txn::CacheResult<()> {
    let tid = TransactionId::new();
    let tuples = scan(cache, tid, file)?;
    println!("  {} tuple(s) in table {}", tuples.len(), TABLE);
    for tuple in &tuples {
        let text = String::from_utf8_lossy(tuple.data());
        println!("    {:?} {}", tuple.record_id(), text.trim_end_matches('\0'));
    }
    cache.complete(tid, true)
}

fn run(data_dir: PathBuf) -> anyhow::Result<()> {
    std::fs::create_dir_all(&data_dir)?;

    let wal = WriteAheadLog::new(data_dir.join("demo.wal"))?;
    let file = Arc::new(HeapFile::open(data_dir.join("demo.tbl"), TABLE, TUPLE_SIZE)?);
    println!("Table {} in {}, log in {}", TABLE, file.get_file_path(), wal.path());

    let cache = PageCache::new(CacheConfig::default(), wal);
    cache.register_file(file.clone())?;

    println!("\n=== Committed transaction ===");
    let t1 = TransactionId::new();
    for text in ["user:1001 John Doe", "user:1002 Jane Smith", "user:1003 Bob Johnson"] {
        cache.insert_tuple(t1, TABLE, &record(text))?;
        println!("  Inserted: {}", text);
    }
    cache.complete(t1, true)?;
    println!("  Committed {}", t1);
    show(&cache, &file)?;

    println!("\n=== Aborted transaction ===");
    let t2 = TransactionId::new();
    let existing = scan(&cache, t2, &*file)?;
    if let Some(victim) = existing.first() {
        cache.delete_tuple(t2, victim)?;
        println!("  Deleted: {:?}", victim.record_id());
    }
    cache.insert_tuple(t2, TABLE, &record("user:1004 never stored"))?;
    cache.complete(t2, false)?;
    println!("  Aborted {}", t2);
    show(&cache, &file)?;

    cache.flush_all()?;
    Ok(())
}

fn main() {
    let level = logger::level_from_env_and_args();
    if let Err(e) = logger::init(level) {
        eprintln!("Failed to install logger: {}", e);
    }

    println!("Rusty Txn Demo");
    info!("Starting demo (log level {})", logger::max_level());

    if let Err(e) = run(PathBuf::from("./data")) {
        error!("Demo failed: {:#}", e);
        std::process::exit(1);
    }
}
