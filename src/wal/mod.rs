mod record;

pub use record::{LogOperation, LogRecord};

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use log::{debug, info, trace, warn};
use anyhow::{Result, Context};

use crate::shared::page::{PageId, TransactionId};

/// What the page cache needs from a log: page images before they reach the
/// table file, transaction outcomes, and a way to make both durable.
pub trait LogSink: Send {
    fn log_write(&mut self, tid: TransactionId, page_id: PageId, before: &[u8], after: &[u8]) -> Result<()>;

    fn log_commit(&mut self, tid: TransactionId) -> Result<()>;

    fn log_abort(&mut self, tid: TransactionId) -> Result<()>;

    /// Returns once everything appended so far is on stable storage
    fn force(&mut self) -> Result<()>;
}

/// Write-Ahead Log for durability and crash recovery
pub struct WriteAheadLog {
    writer: BufWriter<File>,
    path: String,
}

impl WriteAheadLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        info!("Creating WriteAheadLog at {}", path_str);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context(format!("Failed to open WAL file at {}", path_str))?;

        Ok(Self {
            writer: BufWriter::new(file),
            path: path_str,
        })
    }

    /// Append a log record to the buffered writer. Not durable until `force`.
    pub fn append(&mut self, record: LogRecord) -> Result<()> {
        trace!("Appending record with timestamp {}", record.timestamp);

        let serialized = record.serialize()
            .context("Failed to serialize log record")?;
        debug!("Serialized record size: {}", serialized.len());

        self.writer.write_all(&serialized)
            .context("Failed to write record to WAL")?;
        Ok(())
    }

    /// Reads back every complete record. A torn or corrupt tail ends the scan.
    pub fn read_all(&self) -> Result<Vec<LogRecord>> {
        let bytes = fs::read(&self.path)
            .context(format!("Failed to read WAL file at {}", self.path))?;

        let mut records = Vec::new();
        let mut offset = 0;
        while let Some(len) = LogRecord::framed_len(&bytes[offset..]) {
            if offset + len > bytes.len() {
                warn!("Incomplete record at offset {} in {}", offset, self.path);
                break;
            }
            match LogRecord::deserialize(&bytes[offset..offset + len]) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!("Stopping WAL scan at offset {}: {}", offset, e);
                    break;
                }
            }
            offset += len;
        }
        Ok(records)
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl LogSink for WriteAheadLog {
    fn log_write(&mut self, tid: TransactionId, page_id: PageId, before: &[u8], after: &[u8]) -> Result<()> {
        self.append(LogRecord::new_update(tid, page_id, before.to_vec(), after.to_vec()))
    }

    fn log_commit(&mut self, tid: TransactionId) -> Result<()> {
        self.append(LogRecord::new_commit(tid))
    }

    fn log_abort(&mut self, tid: TransactionId) -> Result<()> {
        self.append(LogRecord::new_abort(tid))
    }

    fn force(&mut self) -> Result<()> {
        debug!("Forcing WAL");
        self.writer.flush()
            .context("Failed to flush WAL")?;
        self.writer.get_ref().sync_data()
            .context("Failed to sync WAL")?;
        Ok(())
    }
}
