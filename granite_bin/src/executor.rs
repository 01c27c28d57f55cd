//! The query operators. Each implements the volcano contract: `init`
//! prepares state, `next` yields one row per call until `None`.

use crate::errors::ExecutionError;
use crate::types::{Row, Schema};

mod aggregate;
mod insert;
mod join;
mod scan;

pub use aggregate::{AggregateExpr, AggregateOp, HashAggregateExecutor};
pub use insert::InsertExecutor;
pub use join::HashJoinExecutor;
pub use scan::SeqScanExecutor;

pub trait Executor {
    fn schema(&self) -> &Schema;

    fn init(&mut self) -> Result<(), ExecutionError>;

    fn next(&mut self) -> Result<Option<Row>, ExecutionError>;
}
