use thiserror::Error;

use crate::shared::page::{PageId, TransactionId};

use super::LockMode;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("{tid} timed out waiting for {mode:?} lock on page {pid}")]
    Timeout {
        tid: TransactionId,
        pid: PageId,
        mode: LockMode,
    },

    #[error("Lock table poisoned: {0}")]
    Poisoned(String),
}

pub type LockResult<T> = std::result::Result<T, LockError>;
