//! Two-pass ARIES-style recovery. Redo replays the whole log forward,
//! guarded by each page's LSN; undo walks the prev-LSN chains of the
//! transactions left unfinished and applies the inverse of each record.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use crate::buffer_pool::BufferPoolManager;
use crate::disk::DiskManager;
use crate::log_record::{LogRecord, LogRecordPayload};
use crate::tuple::Rid;
use crate::{Lsn, PageId, TxnId, INVALID_LSN, INVALID_PAGE_ID};

fn all_frames_pinned() -> io::Error {
    io::Error::other("all pages are pinned")
}

pub struct LogRecovery {
    disk: Arc<DiskManager>,
    bpm: Arc<BufferPoolManager>,
    /// Transaction id -> LSN of its most recently seen record. Whatever
    /// survives redo without a COMMIT/ABORT is a loser.
    active_txn: HashMap<TxnId, Lsn>,
    /// LSN -> byte offset in the log file, built during redo so undo can
    /// seek backwards along prev-LSN chains.
    lsn_mapping: HashMap<Lsn, u64>,
    log_buffer: Vec<u8>,
    offset: u64,
    max_lsn: Lsn,
}

impl LogRecovery {
    pub fn new(disk: Arc<DiskManager>, bpm: Arc<BufferPoolManager>, buffer_size: usize) -> Self {
        Self {
            disk,
            bpm,
            active_txn: HashMap::new(),
            lsn_mapping: HashMap::new(),
            log_buffer: vec![0; buffer_size],
            offset: 0,
            max_lsn: INVALID_LSN,
        }
    }

    /// Highest LSN seen during redo; the log manager restarts after it.
    pub fn max_lsn(&self) -> Lsn {
        self.max_lsn
    }

    /// Replays the log from the beginning. A record is applied only when
    /// the page's LSN shows it never reached disk; a partial or corrupt
    /// tail stops the scan cleanly.
    pub fn redo(&mut self) -> io::Result<()> {
        self.offset = 0;
        loop {
            let read = self.disk.read_log(&mut self.log_buffer, self.offset)?;
            if read == 0 {
                break;
            }

            let mut pos = 0;
            while let Some(record) = LogRecord::deserialize(&self.log_buffer[pos..read]) {
                let lsn = record.lsn;
                self.lsn_mapping.insert(lsn, self.offset + pos as u64);
                self.active_txn.insert(record.txn_id, lsn);
                if lsn > self.max_lsn {
                    self.max_lsn = lsn;
                }
                pos += record.size as usize;

                match &record.payload {
                    LogRecordPayload::Begin => {}
                    LogRecordPayload::Commit | LogRecordPayload::Abort => {
                        self.active_txn.remove(&record.txn_id);
                    }
                    LogRecordPayload::Insert { rid, tuple } => {
                        self.redo_on_page(*rid, lsn, |page| {
                            page.insert_tuple_at(rid.slot, &tuple.data);
                        })?;
                    }
                    LogRecordPayload::MarkDelete { rid, .. } => {
                        self.redo_on_page(*rid, lsn, |page| {
                            page.mark_delete(rid.slot);
                        })?;
                    }
                    LogRecordPayload::ApplyDelete { rid, .. } => {
                        self.redo_on_page(*rid, lsn, |page| {
                            page.apply_delete(rid.slot);
                        })?;
                    }
                    LogRecordPayload::RollbackDelete { rid, .. } => {
                        self.redo_on_page(*rid, lsn, |page| {
                            page.rollback_delete(rid.slot);
                        })?;
                    }
                    LogRecordPayload::Update { rid, new_tuple, .. } => {
                        self.redo_on_page(*rid, lsn, |page| {
                            page.update_tuple(rid.slot, &new_tuple.data);
                        })?;
                    }
                    LogRecordPayload::NewPage {
                        prev_page_id,
                        page_id,
                    } => {
                        self.redo_new_page(*prev_page_id, *page_id, lsn)?;
                    }
                }
            }

            if pos == 0 {
                // Nothing decodable at the head of the buffer: corrupt or
                // partial tail.
                break;
            }
            self.offset += pos as u64;
        }
        Ok(())
    }

    /// Rolls back every loser transaction along its prev-LSN chain, then
    /// clears both tables.
    pub fn undo(&mut self) -> io::Result<()> {
        let losers: Vec<(TxnId, Lsn)> = self.active_txn.iter().map(|(&t, &l)| (t, l)).collect();
        for (txn_id, mut lsn) in losers {
            crate::strata_debug_log!("[LogRecovery::undo] Rolling back txn {txn_id}");
            while lsn != INVALID_LSN {
                let Some(&offset) = self.lsn_mapping.get(&lsn) else {
                    break;
                };
                let read = self.disk.read_log(&mut self.log_buffer, offset)?;
                let Some(record) = LogRecord::deserialize(&self.log_buffer[..read]) else {
                    break;
                };

                match &record.payload {
                    LogRecordPayload::Insert { rid, .. } => {
                        self.undo_on_page(*rid, |page| {
                            page.apply_delete(rid.slot);
                        })?;
                    }
                    LogRecordPayload::Update { rid, old_tuple, .. } => {
                        self.undo_on_page(*rid, |page| {
                            page.update_tuple(rid.slot, &old_tuple.data);
                        })?;
                    }
                    LogRecordPayload::MarkDelete { rid, .. } => {
                        self.undo_on_page(*rid, |page| {
                            page.rollback_delete(rid.slot);
                        })?;
                    }
                    LogRecordPayload::ApplyDelete { rid, tuple } => {
                        self.undo_on_page(*rid, |page| {
                            page.insert_tuple_at(rid.slot, &tuple.data);
                        })?;
                    }
                    LogRecordPayload::RollbackDelete { rid, .. } => {
                        self.undo_on_page(*rid, |page| {
                            page.mark_delete(rid.slot);
                        })?;
                    }
                    LogRecordPayload::Begin
                    | LogRecordPayload::Commit
                    | LogRecordPayload::Abort
                    | LogRecordPayload::NewPage { .. } => {}
                }

                lsn = record.prev_lsn;
            }
        }

        self.active_txn.clear();
        self.lsn_mapping.clear();
        Ok(())
    }

    /// Applies `edit` under the page write latch iff the page has not seen
    /// this record yet, stamping the record's LSN on success.
    fn redo_on_page<F>(&self, rid: Rid, lsn: Lsn, edit: F) -> io::Result<()>
    where
        F: FnOnce(&mut crate::Page),
    {
        let guard = self
            .bpm
            .fetch_page(rid.page_id)?
            .ok_or_else(all_frames_pinned)?;
        let replay = guard.read().lsn() < lsn;
        if replay {
            let mut page = guard.write();
            edit(&mut page);
            page.set_lsn(lsn);
        }
        Ok(())
    }

    fn undo_on_page<F>(&self, rid: Rid, edit: F) -> io::Result<()>
    where
        F: FnOnce(&mut crate::Page),
    {
        let guard = self
            .bpm
            .fetch_page(rid.page_id)?
            .ok_or_else(all_frames_pinned)?;
        let mut page = guard.write();
        edit(&mut page);
        Ok(())
    }

    fn redo_new_page(&self, prev_page_id: PageId, page_id: PageId, lsn: Lsn) -> io::Result<()> {
        let guard = self
            .bpm
            .fetch_page(page_id)?
            .ok_or_else(all_frames_pinned)?;
        let replay = guard.read().lsn() < lsn;
        if replay {
            {
                let mut page = guard.write();
                page.init_table_page(page_id, prev_page_id);
                page.set_lsn(lsn);
            }

            if prev_page_id != INVALID_PAGE_ID {
                let prev_guard = self
                    .bpm
                    .fetch_page(prev_page_id)?
                    .ok_or_else(all_frames_pinned)?;
                let needs_link = prev_guard.read().next_page_id() != page_id;
                if needs_link {
                    prev_guard.write().set_next_page_id(page_id);
                }
            }
        }
        Ok(())
    }
}
