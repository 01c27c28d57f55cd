use std::collections::HashMap;

use super::Executor;
use crate::errors::ExecutionError;
use crate::types::{Column, DataType, Row, Schema, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Count,
    Sum,
    Min,
    Max,
}

#[derive(Debug, Clone)]
pub struct AggregateExpr {
    pub op: AggregateOp,
    /// Input column the aggregate reads.
    pub column: usize,
    pub alias: String,
}

#[derive(Debug, Clone, Default)]
struct AggregateState {
    count: i64,
    sum: i64,
    min: Option<Value>,
    max: Option<Value>,
}

impl AggregateState {
    fn absorb(&mut self, value: &Value) {
        self.count += 1;
        if let Value::Int(n) = value {
            self.sum += *n as i64;
        }
        if self.min.as_ref().map_or(true, |m| value < m) {
            self.min = Some(value.clone());
        }
        if self.max.as_ref().map_or(true, |m| value > m) {
            self.max = Some(value.clone());
        }
    }

    fn result(&self, op: AggregateOp) -> Value {
        match op {
            AggregateOp::Count => Value::Int(self.count as i32),
            AggregateOp::Sum => Value::Int(self.sum as i32),
            AggregateOp::Min => self.min.clone().unwrap_or(Value::Int(0)),
            AggregateOp::Max => self.max.clone().unwrap_or(Value::Int(0)),
        }
    }
}

/// Hash aggregation: drains its child into per-group states during `init`,
/// then yields one row per group.
pub struct HashAggregateExecutor<'a> {
    input: Box<dyn Executor + 'a>,
    group_by: Vec<usize>,
    aggregates: Vec<AggregateExpr>,
    schema: Schema,
    results: std::vec::IntoIter<Row>,
}

impl<'a> HashAggregateExecutor<'a> {
    pub fn new(
        input: Box<dyn Executor + 'a>,
        group_by: Vec<usize>,
        aggregates: Vec<AggregateExpr>,
    ) -> Self {
        let mut schema = Schema::new();
        for &idx in &group_by {
            schema.push(input.schema()[idx].clone());
        }
        for agg in &aggregates {
            let data_type = match agg.op {
                AggregateOp::Count | AggregateOp::Sum => DataType::Int,
                AggregateOp::Min | AggregateOp::Max => input.schema()[agg.column].data_type,
            };
            schema.push(Column::new(&agg.alias, data_type));
        }

        Self {
            input,
            group_by,
            aggregates,
            schema,
            results: Vec::new().into_iter(),
        }
    }
}

impl<'a> Executor for HashAggregateExecutor<'a> {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn init(&mut self) -> Result<(), ExecutionError> {
        self.input.init()?;

        let mut groups: HashMap<Vec<Value>, Vec<AggregateState>> = HashMap::new();
        while let Some(row) = self.input.next()? {
            let key: Vec<Value> = self.group_by.iter().map(|&i| row[i].clone()).collect();
            let states = groups
                .entry(key)
                .or_insert_with(|| vec![AggregateState::default(); self.aggregates.len()]);
            for (state, agg) in states.iter_mut().zip(&self.aggregates) {
                state.absorb(&row[agg.column]);
            }
        }

        let mut rows: Vec<Row> = groups
            .into_iter()
            .map(|(key, states)| {
                let mut row = key;
                for (state, agg) in states.iter().zip(&self.aggregates) {
                    row.push(state.result(agg.op));
                }
                row
            })
            .collect();
        rows.sort();
        self.results = rows.into_iter();
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>, ExecutionError> {
        Ok(self.results.next())
    }
}
