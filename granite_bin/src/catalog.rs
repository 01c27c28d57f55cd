//! The system catalog: table name -> schema + heap. Kept in memory and
//! rebuilt by the driver; the storage underneath is what survives
//! restarts.

use std::collections::HashMap;
use std::sync::Arc;

use strata::buffer_pool::BufferPoolManager;
use strata::log_manager::LogManager;
use strata::table_heap::TableHeap;
use strata::transaction::Transaction;
use strata::PageId;

use crate::errors::ExecutionError;
use crate::types::Schema;

pub struct TableInfo {
    pub name: String,
    pub oid: u32,
    pub schema: Schema,
    pub heap: Arc<TableHeap>,
}

pub struct Catalog {
    bpm: Arc<BufferPoolManager>,
    log: Option<Arc<LogManager>>,
    tables: HashMap<String, Arc<TableInfo>>,
    next_oid: u32,
}

impl Catalog {
    pub fn new(bpm: Arc<BufferPoolManager>, log: Option<Arc<LogManager>>) -> Self {
        Self {
            bpm,
            log,
            tables: HashMap::new(),
            next_oid: 0,
        }
    }

    /// Creates the heap and registers the table.
    pub fn create_table(
        &mut self,
        name: &str,
        schema: Schema,
        txn: &mut Transaction,
    ) -> Result<Arc<TableInfo>, ExecutionError> {
        if self.tables.contains_key(name) {
            return Err(ExecutionError::TableAlreadyExists(name.to_string()));
        }

        let heap = TableHeap::create(Arc::clone(&self.bpm), self.log.clone(), txn)?;
        let info = Arc::new(TableInfo {
            name: name.to_string(),
            oid: self.next_oid,
            schema,
            heap: Arc::new(heap),
        });
        self.next_oid += 1;
        self.tables.insert(name.to_string(), Arc::clone(&info));
        crate::granite_debug_log!("[Catalog::create_table] '{name}' oid {}", info.oid);
        Ok(info)
    }

    /// Re-registers a table whose heap already exists on disk (used after
    /// restart, when the driver knows its first page id).
    pub fn attach_table(
        &mut self,
        name: &str,
        schema: Schema,
        first_page_id: PageId,
    ) -> Arc<TableInfo> {
        let heap = TableHeap::open(Arc::clone(&self.bpm), self.log.clone(), first_page_id);
        let info = Arc::new(TableInfo {
            name: name.to_string(),
            oid: self.next_oid,
            schema,
            heap: Arc::new(heap),
        });
        self.next_oid += 1;
        self.tables.insert(name.to_string(), Arc::clone(&info));
        info
    }

    pub fn table(&self, name: &str) -> Result<Arc<TableInfo>, ExecutionError> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| ExecutionError::TableNotFound(name.to_string()))
    }
}
