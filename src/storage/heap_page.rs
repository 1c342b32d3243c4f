//! Slotted layout shared by the heap file variants.
//!
//! A page starts with a bitmap of used slots, followed by fixed-size tuple
//! slots. The whole page is zero when empty, so freshly appended pages need
//! no initialization.

use log::{debug, trace};

use crate::buffer::error::{CacheError, CacheResult};
use crate::shared::page::{PageId, PageRef, Permissions, TableId, TransactionId, PAGE_SIZE};
use crate::shared::tuple::{RecordId, Tuple};

use super::PageSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapLayout {
    tuple_size: usize,
    slots: usize,
}

impl HeapLayout {
    pub fn new(tuple_size: usize) -> CacheResult<Self> {
        if tuple_size == 0 {
            return Err(CacheError::InvalidTuple("tuple size must be positive".into()));
        }
        let slots = (PAGE_SIZE * 8) / (tuple_size * 8 + 1);
        if slots == 0 {
            return Err(CacheError::InvalidTuple(format!(
                "tuple size {} does not fit in a {} byte page",
                tuple_size, PAGE_SIZE
            )));
        }
        Ok(Self { tuple_size, slots })
    }

    pub fn tuple_size(&self) -> usize {
        self.tuple_size
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    fn header_len(&self) -> usize {
        (self.slots + 7) / 8
    }

    fn slot_offset(&self, slot: usize) -> usize {
        self.header_len() + slot * self.tuple_size
    }

    pub fn is_used(&self, data: &[u8], slot: usize) -> bool {
        slot < self.slots && data[slot / 8] & (1 << (slot % 8)) != 0
    }

    fn set_used(&self, data: &mut [u8], slot: usize, used: bool) {
        if used {
            data[slot / 8] |= 1 << (slot % 8);
        } else {
            data[slot / 8] &= !(1 << (slot % 8));
        }
    }

    pub fn free_slot(&self, data: &[u8]) -> Option<usize> {
        (0..self.slots).find(|&slot| !self.is_used(data, slot))
    }

    pub fn used_slots(&self, data: &[u8]) -> usize {
        (0..self.slots).filter(|&slot| self.is_used(data, slot)).count()
    }

    fn write(&self, data: &mut [u8], slot: usize, bytes: &[u8]) {
        let start = self.slot_offset(slot);
        data[start..start + self.tuple_size].copy_from_slice(bytes);
        self.set_used(data, slot, true);
    }

    fn clear(&self, data: &mut [u8], slot: usize) {
        let start = self.slot_offset(slot);
        data[start..start + self.tuple_size].fill(0);
        self.set_used(data, slot, false);
    }

    /// Every live tuple on the page, tagged with its record id
    pub fn tuples(&self, page_id: PageId, data: &[u8]) -> Vec<Tuple> {
        (0..self.slots)
            .filter(|&slot| self.is_used(data, slot))
            .map(|slot| {
                let start = self.slot_offset(slot);
                Tuple::new(data[start..start + self.tuple_size].to_vec())
                    .with_record_id(RecordId::new(page_id, slot))
            })
            .collect()
    }
}

/// Places `tuple` on the first page with a free slot, appending a page when
/// all existing ones are full. Pages are read with `ReadOnly` and only the
/// chosen one is upgraded to `ReadWrite`.
pub(crate) fn insert_tuple<F>(
    layout: &HeapLayout,
    table_id: TableId,
    num_pages: u32,
    source: &dyn PageSource,
    tid: TransactionId,
    tuple: &Tuple,
    append_page: F,
) -> CacheResult<Vec<PageRef>>
where
    F: FnOnce() -> CacheResult<PageId>,
{
    if tuple.len() != layout.tuple_size {
        return Err(CacheError::InvalidTuple(format!(
            "expected {} bytes, got {}",
            layout.tuple_size,
            tuple.len()
        )));
    }

    for page_number in 0..num_pages {
        let pid = PageId::new(table_id, page_number);
        let page = source.fetch(tid, pid, Permissions::ReadOnly)?;
        let has_space = {
            let guard = page
                .read()
                .map_err(|e| CacheError::LockPoisoned(e.to_string()))?;
            layout.free_slot(guard.get_data()).is_some()
        };
        if !has_space {
            trace!("Page {} is full", pid);
            continue;
        }

        let page = source.fetch(tid, pid, Permissions::ReadWrite)?;
        if place(layout, &page, tuple)?.is_some() {
            return Ok(vec![page]);
        }
    }

    let pid = append_page()?;
    debug!("Appended page {} for {}", pid, tid);
    let page = source.fetch(tid, pid, Permissions::ReadWrite)?;
    match place(layout, &page, tuple)? {
        Some(_) => Ok(vec![page]),
        None => Err(CacheError::InvalidTuple(format!(
            "appended page {} has no free slot",
            pid
        ))),
    }
}

fn place(layout: &HeapLayout, page: &PageRef, tuple: &Tuple) -> CacheResult<Option<usize>> {
    let mut guard = page
        .write()
        .map_err(|e| CacheError::LockPoisoned(e.to_string()))?;
    let slot = match layout.free_slot(guard.get_data()) {
        Some(slot) => slot,
        None => return Ok(None),
    };
    layout.write(&mut guard.get_data_mut()[..], slot, tuple.data());
    trace!("Placed tuple in slot {} of page {}", slot, guard.get_page_id());
    Ok(Some(slot))
}

/// Clears the slot named by the tuple's record id
pub(crate) fn delete_tuple(
    layout: &HeapLayout,
    table_id: TableId,
    source: &dyn PageSource,
    tid: TransactionId,
    tuple: &Tuple,
) -> CacheResult<Vec<PageRef>> {
    let rid = tuple
        .record_id()
        .ok_or_else(|| CacheError::TupleNotFound("tuple has no record id".into()))?;
    if rid.page_id.table_id != table_id {
        return Err(CacheError::TupleNotFound(format!(
            "record {}#{} is not in table {}",
            rid.page_id, rid.slot, table_id
        )));
    }

    let page = source.fetch(tid, rid.page_id, Permissions::ReadWrite)?;
    {
        let mut guard = page
            .write()
            .map_err(|e| CacheError::LockPoisoned(e.to_string()))?;
        if !layout.is_used(guard.get_data(), rid.slot) {
            return Err(CacheError::TupleNotFound(format!(
                "slot {} of page {} is empty",
                rid.slot, rid.page_id
            )));
        }
        layout.clear(&mut guard.get_data_mut()[..], rid.slot);
    }
    Ok(vec![page])
}
