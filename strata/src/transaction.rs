//! Transaction handles. Only what recovery needs: an id and the prev-LSN
//! chain linking a transaction's records back to its BEGIN. There is no
//! lock manager and no MVCC here.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use crate::log_manager::LogManager;
use crate::log_record::{LogRecord, LogRecordPayload};
use crate::{Lsn, TxnId, INVALID_LSN};

/// A live transaction. Every record the transaction writes chains back to
/// the previous one through `prev_lsn`.
#[derive(Debug)]
pub struct Transaction {
    id: TxnId,
    prev_lsn: Lsn,
}

impl Transaction {
    pub fn new(id: TxnId) -> Self {
        Self {
            id,
            prev_lsn: INVALID_LSN,
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn prev_lsn(&self) -> Lsn {
        self.prev_lsn
    }

    pub fn set_prev_lsn(&mut self, lsn: Lsn) {
        self.prev_lsn = lsn;
    }
}

/// Vends transaction ids and writes the BEGIN/COMMIT/ABORT bracket records.
pub struct TransactionManager {
    next_txn_id: AtomicI32,
    log: Option<Arc<LogManager>>,
}

impl TransactionManager {
    pub fn new(first_txn_id: TxnId, log: Option<Arc<LogManager>>) -> Self {
        Self {
            next_txn_id: AtomicI32::new(first_txn_id),
            log,
        }
    }

    pub fn begin(&self) -> Transaction {
        let id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let mut txn = Transaction::new(id);
        self.append(&mut txn, LogRecordPayload::Begin);
        crate::strata_debug_log!("[TransactionManager::begin] Started txn {id}");
        txn
    }

    /// Begins a transaction with a caller-chosen id (the driver replays
    /// ids across restarts this way in tests).
    pub fn begin_with_id(&self, id: TxnId) -> Transaction {
        self.next_txn_id.fetch_max(id + 1, Ordering::SeqCst);
        let mut txn = Transaction::new(id);
        self.append(&mut txn, LogRecordPayload::Begin);
        txn
    }

    /// Writes the COMMIT record and forces the log: when this returns, the
    /// transaction's work is durable.
    pub fn commit(&self, txn: &mut Transaction) {
        self.append(txn, LogRecordPayload::Commit);
        if let Some(log) = &self.log {
            log.flush();
        }
        crate::strata_debug_log!("[TransactionManager::commit] Committed txn {}", txn.id());
    }

    /// Writes the ABORT record. Recovery treats an aborted transaction as
    /// finished, so the caller must have rolled its effects back already.
    pub fn abort(&self, txn: &mut Transaction) {
        self.append(txn, LogRecordPayload::Abort);
        if let Some(log) = &self.log {
            log.flush();
        }
        crate::strata_debug_log!("[TransactionManager::abort] Aborted txn {}", txn.id());
    }

    fn append(&self, txn: &mut Transaction, payload: LogRecordPayload) {
        if let Some(log) = &self.log {
            let mut record = LogRecord::new(txn.id(), txn.prev_lsn(), payload);
            let lsn = log.append_log_record(&mut record);
            txn.set_prev_lsn(lsn);
        }
    }
}
