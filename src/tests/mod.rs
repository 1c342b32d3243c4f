mod txn_tests;

use std::sync::{Arc, Mutex};
use anyhow::{anyhow, Result};

use crate::shared::page::{PageId, PageRef, TransactionId};
use crate::wal::LogSink;

/// Copies the current content of a page handle
pub(crate) fn snapshot(page: &PageRef) -> Vec<u8> {
    page.read().unwrap().get_data().to_vec()
}

/// Log that remembers the calls made to it, for checking the order of
/// log writes and forces against table writes
#[derive(Clone, Default)]
pub(crate) struct RecordingLog {
    entries: Arc<Mutex<Vec<String>>>,
    fail_forces: Arc<Mutex<bool>>,
}

impl RecordingLog {
    pub(crate) fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    pub(crate) fn fail_forces(&self) {
        *self.fail_forces.lock().unwrap() = true;
    }

    fn push(&self, entry: String) {
        self.entries.lock().unwrap().push(entry);
    }
}

impl LogSink for RecordingLog {
    fn log_write(&mut self, tid: TransactionId, page_id: PageId, _before: &[u8], _after: &[u8]) -> Result<()> {
        self.push(format!("write {} {}", tid, page_id));
        Ok(())
    }

    fn log_commit(&mut self, tid: TransactionId) -> Result<()> {
        self.push(format!("commit {}", tid));
        Ok(())
    }

    fn log_abort(&mut self, tid: TransactionId) -> Result<()> {
        self.push(format!("abort {}", tid));
        Ok(())
    }

    fn force(&mut self) -> Result<()> {
        if *self.fail_forces.lock().unwrap() {
            return Err(anyhow!("log device unavailable"));
        }
        self.push("force".to_string());
        Ok(())
    }
}
