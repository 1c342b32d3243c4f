use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

pub const PAGE_SIZE: usize = 4096; // Page size is 4KB

pub type TableId = u32;

/// Shared handle to a resident page. Holding one does not keep the page resident.
pub type PageRef = Arc<RwLock<Page>>;

/// Identity of a page: the table it belongs to and its position in that table's file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId {
    pub table_id: TableId,
    pub page_number: u32,
}

impl PageId {
    pub fn new(table_id: TableId, page_number: u32) -> Self {
        Self { table_id, page_number }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table_id, self.page_number)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(Uuid);

impl TransactionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

// Written as the hyphenless hex form so every serde format sees a plain string
impl Serialize for TransactionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.simple().to_string())
    }
}

impl<'de> Deserialize<'de> for TransactionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Uuid::parse_str(&text).map(Self).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0.simple())
    }
}

/// Access a caller asks for when fetching a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permissions {
    ReadOnly,
    ReadWrite,
}

pub struct Page {
    page_id: PageId,
    data: Box<[u8; PAGE_SIZE]>,
    before_image: Box<[u8; PAGE_SIZE]>,
    dirtied_by: Option<TransactionId>,
}

impl Page {
    /// An all-zero page whose before-image is also all zero
    pub fn new(page_id: PageId) -> Self {
        Self {
            page_id,
            data: Box::new([0; PAGE_SIZE]),
            before_image: Box::new([0; PAGE_SIZE]),
            dirtied_by: None,
        }
    }

    /// Builds a clean page from on-disk bytes; the before-image starts out equal to them
    pub fn from_bytes(page_id: PageId, bytes: &[u8]) -> Self {
        let mut page = Self::new(page_id);
        page.copy_from(bytes);
        page.set_before_image();
        page
    }

    pub fn get_page_id(&self) -> PageId {
        self.page_id
    }

    pub fn get_data(&self) -> &[u8; PAGE_SIZE] {
        &self.data
    }

    pub fn get_data_mut(&mut self) -> &mut [u8; PAGE_SIZE] {
        &mut self.data
    }

    pub fn copy_from(&mut self, data: &[u8]) {
        let len = std::cmp::min(data.len(), PAGE_SIZE);
        self.data[..len].copy_from_slice(&data[..len]);
    }

    pub fn mark_dirty(&mut self, tid: Option<TransactionId>) {
        self.dirtied_by = tid;
    }

    pub fn dirtied_by(&self) -> Option<TransactionId> {
        self.dirtied_by
    }

    pub fn is_dirty(&self) -> bool {
        self.dirtied_by.is_some()
    }

    pub fn get_before_image(&self) -> &[u8; PAGE_SIZE] {
        &self.before_image
    }

    /// Snapshots the current content as the rollback point for the next writer
    pub fn set_before_image(&mut self) {
        self.before_image.copy_from_slice(&self.data[..]);
    }

    /// Throws away uncommitted changes and leaves the page clean
    pub fn restore_before_image(&mut self) {
        self.data.copy_from_slice(&self.before_image[..]);
        self.dirtied_by = None;
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("page_id", &self.page_id)
            .field("dirtied_by", &self.dirtied_by)
            .finish()
    }
}
