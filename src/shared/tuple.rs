use bytes::Bytes;

use super::page::PageId;

/// Location of a stored tuple: its page and the slot within that page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: usize,
}

impl RecordId {
    pub fn new(page_id: PageId, slot: usize) -> Self {
        Self { page_id, slot }
    }
}

/// A fixed-size record. `record_id` is set once the tuple has been stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    record_id: Option<RecordId>,
    data: Bytes,
}

impl Tuple {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            record_id: None,
            data: data.into(),
        }
    }

    pub fn with_record_id(mut self, record_id: RecordId) -> Self {
        self.record_id = Some(record_id);
        self
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
