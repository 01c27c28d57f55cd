//! Log record layout and wire codec.
//!
//! Every record starts with a fixed 20-byte header, followed by a
//! kind-specific body:
//!
//! ```text
//! | size (u32) | lsn (i32) | txn_id (i32) | prev_lsn (i32) | kind (u32) | body |
//! ```
//!
//! Bodies: INSERT and the three DELETE kinds carry an rid plus a
//! length-prefixed tuple; UPDATE carries an rid, the old tuple and the new
//! tuple; NEWPAGE carries the predecessor page id and the new page id;
//! BEGIN/COMMIT/ABORT are header-only. All fields are little-endian.

use bytes::BufMut;

use crate::tuple::{Rid, Tuple};
use crate::{Lsn, PageId, TxnId, INVALID_LSN};

pub const LOG_HEADER_SIZE: usize = 20;

const KIND_INSERT: u32 = 1;
const KIND_MARK_DELETE: u32 = 2;
const KIND_APPLY_DELETE: u32 = 3;
const KIND_ROLLBACK_DELETE: u32 = 4;
const KIND_UPDATE: u32 = 5;
const KIND_BEGIN: u32 = 6;
const KIND_COMMIT: u32 = 7;
const KIND_ABORT: u32 = 8;
const KIND_NEW_PAGE: u32 = 9;

/// What a log record describes. One variant per record kind.
#[derive(Debug, Clone, PartialEq)]
pub enum LogRecordPayload {
    Begin,
    Commit,
    Abort,
    Insert {
        rid: Rid,
        tuple: Tuple,
    },
    MarkDelete {
        rid: Rid,
        tuple: Tuple,
    },
    ApplyDelete {
        rid: Rid,
        tuple: Tuple,
    },
    RollbackDelete {
        rid: Rid,
        tuple: Tuple,
    },
    Update {
        rid: Rid,
        old_tuple: Tuple,
        new_tuple: Tuple,
    },
    NewPage {
        prev_page_id: PageId,
        page_id: PageId,
    },
}

impl LogRecordPayload {
    fn kind(&self) -> u32 {
        match self {
            LogRecordPayload::Insert { .. } => KIND_INSERT,
            LogRecordPayload::MarkDelete { .. } => KIND_MARK_DELETE,
            LogRecordPayload::ApplyDelete { .. } => KIND_APPLY_DELETE,
            LogRecordPayload::RollbackDelete { .. } => KIND_ROLLBACK_DELETE,
            LogRecordPayload::Update { .. } => KIND_UPDATE,
            LogRecordPayload::Begin => KIND_BEGIN,
            LogRecordPayload::Commit => KIND_COMMIT,
            LogRecordPayload::Abort => KIND_ABORT,
            LogRecordPayload::NewPage { .. } => KIND_NEW_PAGE,
        }
    }

    fn body_size(&self) -> usize {
        match self {
            LogRecordPayload::Begin | LogRecordPayload::Commit | LogRecordPayload::Abort => 0,
            LogRecordPayload::Insert { tuple, .. }
            | LogRecordPayload::MarkDelete { tuple, .. }
            | LogRecordPayload::ApplyDelete { tuple, .. }
            | LogRecordPayload::RollbackDelete { tuple, .. } => {
                Rid::SERIALIZED_SIZE + tuple.serialized_size()
            }
            LogRecordPayload::Update {
                old_tuple,
                new_tuple,
                ..
            } => Rid::SERIALIZED_SIZE + old_tuple.serialized_size() + new_tuple.serialized_size(),
            LogRecordPayload::NewPage { .. } => 8,
        }
    }
}

/// A log record. The LSN is assigned by the log manager at append time.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub size: u32,
    pub lsn: Lsn,
    pub txn_id: TxnId,
    pub prev_lsn: Lsn,
    pub payload: LogRecordPayload,
}

impl LogRecord {
    pub fn new(txn_id: TxnId, prev_lsn: Lsn, payload: LogRecordPayload) -> Self {
        Self {
            size: (LOG_HEADER_SIZE + payload.body_size()) as u32,
            lsn: INVALID_LSN,
            txn_id,
            prev_lsn,
            payload,
        }
    }

    pub fn serialize_into(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(self.size);
        buf.put_i32_le(self.lsn);
        buf.put_i32_le(self.txn_id);
        buf.put_i32_le(self.prev_lsn);
        buf.put_u32_le(self.payload.kind());

        match &self.payload {
            LogRecordPayload::Begin | LogRecordPayload::Commit | LogRecordPayload::Abort => {}
            LogRecordPayload::Insert { rid, tuple }
            | LogRecordPayload::MarkDelete { rid, tuple }
            | LogRecordPayload::ApplyDelete { rid, tuple }
            | LogRecordPayload::RollbackDelete { rid, tuple } => {
                rid.serialize_into(buf);
                tuple.serialize_into(buf);
            }
            LogRecordPayload::Update {
                rid,
                old_tuple,
                new_tuple,
            } => {
                rid.serialize_into(buf);
                old_tuple.serialize_into(buf);
                new_tuple.serialize_into(buf);
            }
            LogRecordPayload::NewPage {
                prev_page_id,
                page_id,
            } => {
                buf.put_i32_le(*prev_page_id);
                buf.put_i32_le(*page_id);
            }
        }
    }

    /// Deserializes the record at the start of `buf`. `None` when the
    /// record is incomplete or its header is corrupt (size non-positive,
    /// smaller than the header, or reaching past the buffer).
    pub fn deserialize(buf: &[u8]) -> Option<LogRecord> {
        if buf.len() < LOG_HEADER_SIZE {
            return None;
        }
        let size = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let lsn = Lsn::from_le_bytes(buf[4..8].try_into().unwrap());
        let txn_id = TxnId::from_le_bytes(buf[8..12].try_into().unwrap());
        let prev_lsn = Lsn::from_le_bytes(buf[12..16].try_into().unwrap());
        let kind = u32::from_le_bytes(buf[16..20].try_into().unwrap());

        if (size as usize) < LOG_HEADER_SIZE || size as usize > buf.len() {
            return None;
        }

        let mut body = &buf[LOG_HEADER_SIZE..size as usize];
        let payload = match kind {
            KIND_BEGIN => LogRecordPayload::Begin,
            KIND_COMMIT => LogRecordPayload::Commit,
            KIND_ABORT => LogRecordPayload::Abort,
            KIND_INSERT | KIND_MARK_DELETE | KIND_APPLY_DELETE | KIND_ROLLBACK_DELETE => {
                let rid = Rid::deserialize(&mut body)?;
                let tuple = Tuple::deserialize(&mut body)?;
                match kind {
                    KIND_INSERT => LogRecordPayload::Insert { rid, tuple },
                    KIND_MARK_DELETE => LogRecordPayload::MarkDelete { rid, tuple },
                    KIND_APPLY_DELETE => LogRecordPayload::ApplyDelete { rid, tuple },
                    _ => LogRecordPayload::RollbackDelete { rid, tuple },
                }
            }
            KIND_UPDATE => {
                let rid = Rid::deserialize(&mut body)?;
                let old_tuple = Tuple::deserialize(&mut body)?;
                let new_tuple = Tuple::deserialize(&mut body)?;
                LogRecordPayload::Update {
                    rid,
                    old_tuple,
                    new_tuple,
                }
            }
            KIND_NEW_PAGE => {
                if body.len() < 8 {
                    return None;
                }
                let prev_page_id = PageId::from_le_bytes(body[0..4].try_into().unwrap());
                let page_id = PageId::from_le_bytes(body[4..8].try_into().unwrap());
                LogRecordPayload::NewPage {
                    prev_page_id,
                    page_id,
                }
            }
            _ => return None,
        };

        Some(LogRecord {
            size,
            lsn,
            txn_id,
            prev_lsn,
            payload,
        })
    }
}
