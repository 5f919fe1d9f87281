use super::value::{DataType, Value};
use std::mem::size_of;

/// Nullable columnar buffer
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Bool(Vec<Option<bool>>),
    Int64(Vec<Option<i64>>),
    Float64(Vec<Option<f64>>),
    String(Vec<Option<String>>),
    /// Epoch milliseconds
    Timestamp(Vec<Option<i64>>),
}

impl Column {
    pub fn new(data_type: DataType) -> Self {
        Self::with_capacity(data_type, 0)
    }

    pub fn with_capacity(data_type: DataType, capacity: usize) -> Self {
        match data_type {
            DataType::Bool => Column::Bool(Vec::with_capacity(capacity)),
            DataType::Int64 => Column::Int64(Vec::with_capacity(capacity)),
            DataType::Float64 => Column::Float64(Vec::with_capacity(capacity)),
            DataType::String => Column::String(Vec::with_capacity(capacity)),
            DataType::Timestamp => Column::Timestamp(Vec::with_capacity(capacity)),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Column::Bool(_) => DataType::Bool,
            Column::Int64(_) => DataType::Int64,
            Column::Float64(_) => DataType::Float64,
            Column::String(_) => DataType::String,
            Column::Timestamp(_) => DataType::Timestamp,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Bool(v) => v.len(),
            Column::Int64(v) => v.len(),
            Column::Float64(v) => v.len(),
            Column::String(v) => v.len(),
            Column::Timestamp(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a value. Values that do not fit the column type are stored as null,
    /// except that anything can be rendered into a string column.
    pub fn push(&mut self, value: &Value) {
        match (self, value) {
            (Column::Bool(v), Value::Bool(b)) => v.push(Some(*b)),
            (Column::Int64(v), Value::Int64(i) | Value::Timestamp(i)) => v.push(Some(*i)),
            (Column::Float64(v), Value::Float64(f)) => v.push(Some(*f)),
            (Column::Float64(v), Value::Int64(i)) => v.push(Some(*i as f64)),
            (Column::String(v), Value::String(s)) => v.push(Some(s.clone())),
            (Column::String(v), Value::Null) => v.push(None),
            (Column::String(v), other) => v.push(Some(other.to_string())),
            (Column::Timestamp(v), Value::Timestamp(t) | Value::Int64(t)) => v.push(Some(*t)),
            (Column::Bool(v), _) => v.push(None),
            (Column::Int64(v), _) => v.push(None),
            (Column::Float64(v), _) => v.push(None),
            (Column::Timestamp(v), _) => v.push(None),
        }
    }

    pub fn get(&self, index: usize) -> Value {
        let value = match self {
            Column::Bool(v) => v.get(index).copied().flatten().map(Value::Bool),
            Column::Int64(v) => v.get(index).copied().flatten().map(Value::Int64),
            Column::Float64(v) => v.get(index).copied().flatten().map(Value::Float64),
            Column::String(v) => v.get(index).cloned().flatten().map(Value::String),
            Column::Timestamp(v) => v.get(index).copied().flatten().map(Value::Timestamp),
        };
        value.unwrap_or(Value::Null)
    }

    /// Copy of rows `[offset, offset + len)`, clamped to the column length
    pub fn slice(&self, offset: usize, len: usize) -> Column {
        fn window<T: Clone>(v: &[T], offset: usize, len: usize) -> Vec<T> {
            let start = offset.min(v.len());
            let end = start.saturating_add(len).min(v.len());
            v[start..end].to_vec()
        }

        match self {
            Column::Bool(v) => Column::Bool(window(v, offset, len)),
            Column::Int64(v) => Column::Int64(window(v, offset, len)),
            Column::Float64(v) => Column::Float64(window(v, offset, len)),
            Column::String(v) => Column::String(window(v, offset, len)),
            Column::Timestamp(v) => Column::Timestamp(window(v, offset, len)),
        }
    }

    /// Append every row of `other`, coercing through `push` when the types differ
    pub fn extend_from(&mut self, other: &Column) {
        match (self, other) {
            (Column::Bool(a), Column::Bool(b)) => a.extend_from_slice(b),
            (Column::Int64(a), Column::Int64(b)) => a.extend_from_slice(b),
            (Column::Float64(a), Column::Float64(b)) => a.extend_from_slice(b),
            (Column::String(a), Column::String(b)) => a.extend_from_slice(b),
            (Column::Timestamp(a), Column::Timestamp(b)) => a.extend_from_slice(b),
            (this, other) => {
                for value in other.iter() {
                    this.push(&value);
                }
            }
        }
    }

    /// Buffer size in bytes: one slot per row plus string payloads.
    ///
    /// Counts length rather than capacity so the figure depends only on the
    /// data, never on how the buffer was grown.
    pub fn size_bytes(&self) -> usize {
        match self {
            Column::Bool(v) => v.len() * size_of::<Option<bool>>(),
            Column::Int64(v) | Column::Timestamp(v) => v.len() * size_of::<Option<i64>>(),
            Column::Float64(v) => v.len() * size_of::<Option<f64>>(),
            Column::String(v) => {
                v.len() * size_of::<Option<String>>()
                    + v.iter().flatten().map(|s| s.len()).sum::<usize>()
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Value> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }
}
