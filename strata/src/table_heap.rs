//! The table heap: a doubly linked chain of slotted pages. Every mutation
//! appends its log record first, applies the page edit second, and stamps
//! the record's LSN onto the page last, so the WAL always covers what is
//! on disk.

use std::io;
use std::sync::Arc;

use crate::buffer_pool::BufferPoolManager;
use crate::log_manager::LogManager;
use crate::log_record::{LogRecord, LogRecordPayload};
use crate::table_page::{TABLE_PAGE_HEADER_SIZE, TUPLE_SLOT_SIZE};
use crate::transaction::Transaction;
use crate::tuple::{Rid, Tuple};
use crate::{Lsn, PageId, INVALID_PAGE_ID, PAGE_SIZE};

fn all_frames_pinned() -> io::Error {
    io::Error::other("all pages are pinned")
}

pub struct TableHeap {
    bpm: Arc<BufferPoolManager>,
    log: Option<Arc<LogManager>>,
    first_page_id: PageId,
}

impl TableHeap {
    /// Creates a heap with one empty page.
    pub fn create(
        bpm: Arc<BufferPoolManager>,
        log: Option<Arc<LogManager>>,
        txn: &mut Transaction,
    ) -> io::Result<Self> {
        let guard = bpm.new_page()?.ok_or_else(all_frames_pinned)?;
        let page_id = guard.page_id();

        let heap = Self {
            bpm: Arc::clone(&bpm),
            log,
            first_page_id: page_id,
        };
        let lsn = heap.append_record(
            txn,
            LogRecordPayload::NewPage {
                prev_page_id: INVALID_PAGE_ID,
                page_id,
            },
        );
        {
            let mut page = guard.write();
            page.init_table_page(page_id, INVALID_PAGE_ID);
            if let Some(lsn) = lsn {
                page.set_lsn(lsn);
            }
        }
        crate::strata_debug_log!("[TableHeap::create] First page: {page_id}");
        Ok(heap)
    }

    /// Reattaches to an existing heap by its first page.
    pub fn open(
        bpm: Arc<BufferPoolManager>,
        log: Option<Arc<LogManager>>,
        first_page_id: PageId,
    ) -> Self {
        Self {
            bpm,
            log,
            first_page_id,
        }
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    /// Inserts a tuple, extending the chain with a fresh page when no page
    /// has room. `None` when the tuple can never fit or the pool is out of
    /// frames for a new page.
    pub fn insert_tuple(&self, tuple: &Tuple, txn: &mut Transaction) -> io::Result<Option<Rid>> {
        if tuple.is_empty()
            || tuple.len() > PAGE_SIZE - TABLE_PAGE_HEADER_SIZE - TUPLE_SLOT_SIZE
        {
            return Ok(None);
        }

        let mut page_id = self.first_page_id;
        loop {
            let guard = self.bpm.fetch_page(page_id)?.ok_or_else(all_frames_pinned)?;
            let mut page = guard.write();

            if let Some(slot) = page.find_insert_slot(tuple.len()) {
                let rid = Rid::new(page_id, slot);
                let lsn = self.append_record(
                    txn,
                    LogRecordPayload::Insert {
                        rid,
                        tuple: tuple.clone(),
                    },
                );
                let claimed = page.insert_tuple(&tuple.data);
                debug_assert_eq!(claimed, Some(slot));
                if let Some(lsn) = lsn {
                    page.set_lsn(lsn);
                }
                return Ok(Some(rid));
            }

            let next = page.next_page_id();
            if next != INVALID_PAGE_ID {
                page_id = next;
                continue;
            }

            // End of the chain: grow it.
            let Some(new_guard) = self.bpm.new_page()? else {
                return Ok(None);
            };
            let new_page_id = new_guard.page_id();
            let lsn = self.append_record(
                txn,
                LogRecordPayload::NewPage {
                    prev_page_id: page_id,
                    page_id: new_page_id,
                },
            );
            {
                let mut new_page = new_guard.write();
                new_page.init_table_page(new_page_id, page_id);
                if let Some(lsn) = lsn {
                    new_page.set_lsn(lsn);
                }
            }
            page.set_next_page_id(new_page_id);
            page_id = new_page_id;
        }
    }

    /// Tuple at `rid`, unless the slot is vacant or marked deleted.
    pub fn get_tuple(&self, rid: Rid) -> io::Result<Option<Tuple>> {
        let guard = self
            .bpm
            .fetch_page(rid.page_id)?
            .ok_or_else(all_frames_pinned)?;
        let page = guard.read();
        Ok(page.get_tuple(rid.slot).map(|data| Tuple::new(data.to_vec())))
    }

    /// Sets the delete mark on a tuple.
    pub fn mark_delete(&self, rid: Rid, txn: &mut Transaction) -> io::Result<bool> {
        let guard = self
            .bpm
            .fetch_page(rid.page_id)?
            .ok_or_else(all_frames_pinned)?;
        let mut page = guard.write();
        let Some(old) = page.get_tuple(rid.slot).map(|d| Tuple::new(d.to_vec())) else {
            return Ok(false);
        };

        let lsn = self.append_record(txn, LogRecordPayload::MarkDelete { rid, tuple: old });
        page.mark_delete(rid.slot);
        if let Some(lsn) = lsn {
            page.set_lsn(lsn);
        }
        Ok(true)
    }

    /// Physically removes a tuple (typically one already mark-deleted).
    pub fn apply_delete(&self, rid: Rid, txn: &mut Transaction) -> io::Result<bool> {
        let guard = self
            .bpm
            .fetch_page(rid.page_id)?
            .ok_or_else(all_frames_pinned)?;
        let mut page = guard.write();
        let Some(old) = page.get_tuple_raw(rid.slot).map(|d| Tuple::new(d.to_vec())) else {
            return Ok(false);
        };

        let lsn = self.append_record(txn, LogRecordPayload::ApplyDelete { rid, tuple: old });
        page.apply_delete(rid.slot);
        if let Some(lsn) = lsn {
            page.set_lsn(lsn);
        }
        Ok(true)
    }

    /// Clears the delete mark.
    pub fn rollback_delete(&self, rid: Rid, txn: &mut Transaction) -> io::Result<bool> {
        let guard = self
            .bpm
            .fetch_page(rid.page_id)?
            .ok_or_else(all_frames_pinned)?;
        let mut page = guard.write();
        let Some(old) = page.get_tuple_raw(rid.slot).map(|d| Tuple::new(d.to_vec())) else {
            return Ok(false);
        };

        let lsn = self.append_record(txn, LogRecordPayload::RollbackDelete { rid, tuple: old });
        page.rollback_delete(rid.slot);
        if let Some(lsn) = lsn {
            page.set_lsn(lsn);
        }
        Ok(true)
    }

    /// Replaces the tuple at `rid` in place.
    pub fn update_tuple(&self, rid: Rid, new_tuple: &Tuple, txn: &mut Transaction) -> io::Result<bool> {
        let guard = self
            .bpm
            .fetch_page(rid.page_id)?
            .ok_or_else(all_frames_pinned)?;
        let mut page = guard.write();
        let Some(old) = page.get_tuple(rid.slot).map(|d| Tuple::new(d.to_vec())) else {
            return Ok(false);
        };
        if !page.can_update_tuple(rid.slot, new_tuple.len()) {
            return Ok(false);
        }

        let lsn = self.append_record(
            txn,
            LogRecordPayload::Update {
                rid,
                old_tuple: old,
                new_tuple: new_tuple.clone(),
            },
        );
        page.update_tuple(rid.slot, &new_tuple.data);
        if let Some(lsn) = lsn {
            page.set_lsn(lsn);
        }
        Ok(true)
    }

    /// Iterates every live tuple in rid order.
    pub fn iter(&self) -> TableIterator<'_> {
        TableIterator {
            heap: self,
            page_id: self.first_page_id,
            slot: 0,
        }
    }

    /// First live tuple at or after `(page_id, slot)`, following the page
    /// chain. Lets stateful cursors scan without borrowing the heap.
    pub fn next_tuple_from(
        &self,
        mut page_id: PageId,
        mut slot: u32,
    ) -> io::Result<Option<(Rid, Tuple)>> {
        loop {
            if page_id == INVALID_PAGE_ID {
                return Ok(None);
            }

            let guard = self.bpm.fetch_page(page_id)?.ok_or_else(all_frames_pinned)?;
            let page = guard.read();
            if let Some(found) = page.next_occupied_slot(slot) {
                let rid = Rid::new(page_id, found);
                let tuple = Tuple::new(page.get_tuple(found).unwrap().to_vec());
                return Ok(Some((rid, tuple)));
            }

            page_id = page.next_page_id();
            slot = 0;
        }
    }

    fn append_record(&self, txn: &mut Transaction, payload: LogRecordPayload) -> Option<Lsn> {
        let log = self.log.as_ref()?;
        let mut record = LogRecord::new(txn.id(), txn.prev_lsn(), payload);
        let lsn = log.append_log_record(&mut record);
        txn.set_prev_lsn(lsn);
        Some(lsn)
    }
}

/// Walks the page chain, skipping vacated and deleted slots.
pub struct TableIterator<'a> {
    heap: &'a TableHeap,
    page_id: PageId,
    slot: u32,
}

impl<'a> Iterator for TableIterator<'a> {
    type Item = io::Result<(Rid, Tuple)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.heap.next_tuple_from(self.page_id, self.slot) {
            Ok(Some((rid, tuple))) => {
                self.page_id = rid.page_id;
                self.slot = rid.slot + 1;
                Some(Ok((rid, tuple)))
            }
            Ok(None) => {
                self.page_id = INVALID_PAGE_ID;
                None
            }
            Err(e) => Some(Err(e)),
        }
    }
}
