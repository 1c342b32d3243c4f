use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::time::{SystemTime, UNIX_EPOCH};
use log::{debug, error, trace};
use anyhow::{Result, Context, anyhow};

use crate::shared::page::{PageId, TransactionId};

/// 4 bytes CRC + 4 bytes payload size
pub const HEADER_SIZE: usize = 8;

/// Operations that can be recorded in the log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogOperation {
    Update {
        tid: TransactionId,
        page_id: PageId,
        before: Vec<u8>,
        after: Vec<u8>,
    },
    Commit {
        tid: TransactionId,
    },
    Abort {
        tid: TransactionId,
    },
}

/// A record in the write-ahead log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: u64,
    pub operation: LogOperation,
}

impl LogRecord {
    /// Before and after images of one page written by `tid`
    pub fn new_update(tid: TransactionId, page_id: PageId, before: Vec<u8>, after: Vec<u8>) -> Self {
        debug!("Creating UPDATE log record for page {} by {}", page_id, tid);
        Self {
            timestamp: current_time_millis(),
            operation: LogOperation::Update {
                tid,
                page_id,
                before,
                after,
            },
        }
    }

    pub fn new_commit(tid: TransactionId) -> Self {
        Self {
            timestamp: current_time_millis(),
            operation: LogOperation::Commit { tid },
        }
    }

    pub fn new_abort(tid: TransactionId) -> Self {
        Self {
            timestamp: current_time_millis(),
            operation: LogOperation::Abort { tid },
        }
    }

    pub fn tid(&self) -> TransactionId {
        match &self.operation {
            LogOperation::Update { tid, .. }
            | LogOperation::Commit { tid }
            | LogOperation::Abort { tid } => *tid,
        }
    }

    /// Serialize the log record with CRC checksum
    pub fn serialize(&self) -> Result<Vec<u8>> {
        trace!("Serializing log record");
        let payload = serde_bencode::to_bytes(self)
            .map_err(|e| anyhow!("Serialization error: {}", e))?;

        let mut hasher = Hasher::new();
        hasher.update(&payload);
        let crc = hasher.finalize();

        let mut buffer = Vec::with_capacity(HEADER_SIZE + payload.len());

        buffer.write_u32::<BigEndian>(crc)
            .context("Failed to write CRC")?;
        buffer.write_u32::<BigEndian>(payload.len() as u32)
            .context("Failed to write payload size")?;

        buffer.extend_from_slice(&payload);

        trace!("Record serialized with size {}", buffer.len());
        Ok(buffer)
    }

    /// Total size of the framed record at the start of `bytes`, if the header is there
    pub fn framed_len(bytes: &[u8]) -> Option<usize> {
        if bytes.len() < HEADER_SIZE {
            return None;
        }
        Some(HEADER_SIZE + BigEndian::read_u32(&bytes[4..HEADER_SIZE]) as usize)
    }

    /// Deserialize a log record from bytes
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(anyhow!("Record too short (< {} bytes)", HEADER_SIZE));
        }

        let mut cursor = Cursor::new(bytes);

        let stored_crc = cursor.read_u32::<BigEndian>()
            .context("Failed to read CRC")?;
        let payload_size = cursor.read_u32::<BigEndian>()
            .context("Failed to read payload size")?;

        let payload_end = HEADER_SIZE + payload_size as usize;

        if bytes.len() < payload_end {
            return Err(anyhow!("Incomplete record: expected {} bytes, got {}", payload_end, bytes.len()));
        }

        let payload = &bytes[HEADER_SIZE..payload_end];

        let mut hasher = Hasher::new();
        hasher.update(payload);
        let calculated_crc = hasher.finalize();

        if calculated_crc != stored_crc {
            error!("CRC check failed: stored={}, calculated={}", stored_crc, calculated_crc);
            return Err(anyhow!("CRC check failed"));
        }

        let record: Self = serde_bencode::from_bytes(payload)
            .map_err(|e| anyhow!("Deserialization error: {}", e))?;

        trace!("Successfully deserialized record with timestamp {}", record.timestamp);
        Ok(record)
    }
}

fn current_time_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| std::time::Duration::from_secs(0))
        .as_millis() as u64
}
