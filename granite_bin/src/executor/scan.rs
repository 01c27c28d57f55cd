use std::sync::Arc;

use strata::{PageId, INVALID_PAGE_ID};

use super::Executor;
use crate::catalog::TableInfo;
use crate::errors::ExecutionError;
use crate::types::{decode_row, Row, Schema};

/// Walks a table heap in rid order, decoding each tuple against the table
/// schema and applying an optional residual predicate.
pub struct SeqScanExecutor<'a> {
    table: Arc<TableInfo>,
    predicate: Option<Box<dyn Fn(&Row) -> bool + 'a>>,
    current_page_id: PageId,
    current_slot: u32,
}

impl<'a> SeqScanExecutor<'a> {
    pub fn new(table: Arc<TableInfo>, predicate: Option<Box<dyn Fn(&Row) -> bool + 'a>>) -> Self {
        let first_page_id = table.heap.first_page_id();
        Self {
            table,
            predicate,
            current_page_id: first_page_id,
            current_slot: 0,
        }
    }

}

impl<'a> Executor for SeqScanExecutor<'a> {
    fn schema(&self) -> &Schema {
        &self.table.schema
    }

    fn init(&mut self) -> Result<(), ExecutionError> {
        self.current_page_id = self.table.heap.first_page_id();
        self.current_slot = 0;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>, ExecutionError> {
        loop {
            let Some((rid, tuple)) = self
                .table
                .heap
                .next_tuple_from(self.current_page_id, self.current_slot)?
            else {
                self.current_page_id = INVALID_PAGE_ID;
                return Ok(None);
            };
            self.current_page_id = rid.page_id;
            self.current_slot = rid.slot + 1;

            let row = decode_row(&tuple.data, &self.table.schema).ok_or_else(|| {
                ExecutionError::TupleDecode(format!(
                    "tuple at ({}, {}) does not match schema of '{}'",
                    rid.page_id, rid.slot, self.table.name
                ))
            })?;

            if let Some(predicate) = &self.predicate {
                if !predicate(&row) {
                    continue;
                }
            }
            return Ok(Some(row));
        }
    }
}
