//! Value and schema vocabulary shared by the operators, plus the
//! length-prefixed row codec used to store rows in the table heap.

use bytes::{Buf, BufMut};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Int,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    Int(i32),
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
}

impl Column {
    pub fn new(name: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
        }
    }
}

pub type Schema = Vec<Column>;

pub type Row = Vec<Value>;

/// Encodes a row against its schema: ints as 4 LE bytes, text as a u32
/// length prefix plus bytes.
pub fn encode_row(row: &[Value]) -> Vec<u8> {
    let mut buf = Vec::new();
    for value in row {
        match value {
            Value::Int(n) => buf.put_i32_le(*n),
            Value::Text(s) => {
                buf.put_u32_le(s.len() as u32);
                buf.put_slice(s.as_bytes());
            }
        }
    }
    buf
}

/// Decodes a row; `None` when the bytes do not match the schema.
pub fn decode_row(data: &[u8], schema: &Schema) -> Option<Row> {
    let mut buf = data;
    let mut row = Vec::with_capacity(schema.len());
    for column in schema {
        match column.data_type {
            DataType::Int => {
                if buf.remaining() < 4 {
                    return None;
                }
                row.push(Value::Int(buf.get_i32_le()));
            }
            DataType::Text => {
                if buf.remaining() < 4 {
                    return None;
                }
                let len = buf.get_u32_le() as usize;
                if buf.remaining() < len {
                    return None;
                }
                let mut bytes = vec![0u8; len];
                buf.copy_to_slice(&mut bytes);
                row.push(Value::Text(String::from_utf8(bytes).ok()?));
            }
        }
    }
    Some(row)
}
