use std::sync::Arc;

use strata::transaction::Transaction;
use strata::Tuple;

use super::Executor;
use crate::catalog::TableInfo;
use crate::errors::ExecutionError;
use crate::types::{encode_row, Row, Schema};

/// Writes raw rows through the table heap. The heap emits the INSERT (and
/// NEWPAGE) log records, so everything inserted here is recoverable. Yields
/// no rows; `rows_inserted` reports the count.
pub struct InsertExecutor<'a> {
    table: Arc<TableInfo>,
    rows: Vec<Row>,
    txn: &'a mut Transaction,
    rows_inserted: usize,
    done: bool,
}

impl<'a> InsertExecutor<'a> {
    pub fn new(table: Arc<TableInfo>, rows: Vec<Row>, txn: &'a mut Transaction) -> Self {
        Self {
            table,
            rows,
            txn,
            rows_inserted: 0,
            done: false,
        }
    }

    pub fn rows_inserted(&self) -> usize {
        self.rows_inserted
    }
}

impl<'a> Executor for InsertExecutor<'a> {
    fn schema(&self) -> &Schema {
        &self.table.schema
    }

    fn init(&mut self) -> Result<(), ExecutionError> {
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>, ExecutionError> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        for row in &self.rows {
            if row.len() != self.table.schema.len() {
                return Err(ExecutionError::GenericError(format!(
                    "row arity {} does not match table '{}'",
                    row.len(),
                    self.table.name
                )));
            }
            let tuple = Tuple::new(encode_row(row));
            let inserted = self.table.heap.insert_tuple(&tuple, self.txn)?;
            if inserted.is_none() {
                return Err(ExecutionError::GenericError(format!(
                    "table '{}' cannot hold the tuple",
                    self.table.name
                )));
            }
            self.rows_inserted += 1;
        }
        Ok(None)
    }
}
