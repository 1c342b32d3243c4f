use std::io;
use thiserror::Error;

use crate::lock::error::LockError;
use crate::lock::LockMode;
use crate::shared::page::{PageId, TableId, TransactionId};

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("{tid} timed out waiting for {mode:?} lock on page {pid}")]
    LockTimeout {
        tid: TransactionId,
        pid: PageId,
        mode: LockMode,
    },

    #[error("No clean page to evict, every resident page is dirty")]
    NoCleanPage,

    #[error("Page {0} does not exist")]
    UnknownPage(PageId),

    #[error("No file registered for table {0}")]
    UnknownTable(TableId),

    #[error("Log error: {0}")]
    Log(#[from] anyhow::Error),

    #[error("Invalid tuple: {0}")]
    InvalidTuple(String),

    #[error("Tuple not found: {0}")]
    TupleNotFound(String),

    #[error("Failed to lock: {0}")]
    LockPoisoned(String),
}

impl From<LockError> for CacheError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Timeout { tid, pid, mode } => CacheError::LockTimeout { tid, pid, mode },
            LockError::Poisoned(msg) => CacheError::LockPoisoned(msg),
        }
    }
}

impl CacheError {
    /// True for errors after which the transaction must be aborted
    pub fn is_transaction_fatal(&self) -> bool {
        matches!(self, CacheError::LockTimeout { .. })
    }
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;
