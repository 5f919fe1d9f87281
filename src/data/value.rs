use serde::{Deserialize, Serialize};
use std::fmt;

/// Column data type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Bool,
    Int64,
    Float64,
    String,
    /// Milliseconds since the Unix epoch
    Timestamp,
}

impl DataType {
    /// Narrowest type holding both; numbers widen to float, anything else to string
    pub fn merge(&self, other: &DataType) -> DataType {
        match (*self, *other) {
            (a, b) if a == b => a,
            (DataType::Int64, DataType::Float64) | (DataType::Float64, DataType::Int64) => {
                DataType::Float64
            }
            (DataType::Int64, DataType::Timestamp) | (DataType::Timestamp, DataType::Int64) => {
                DataType::Int64
            }
            _ => DataType::String,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataType::Bool => "BOOL",
            DataType::Int64 => "INT64",
            DataType::Float64 => "FLOAT64",
            DataType::String => "STRING",
            DataType::Timestamp => "TIMESTAMP",
        })
    }
}

/// One cell of a result row
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    Timestamp(i64),
}

impl Value {
    /// `None` for null
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(DataType::Bool),
            Self::Int64(_) => Some(DataType::Int64),
            Self::Float64(_) => Some(DataType::Float64),
            Self::String(_) => Some(DataType::String),
            Self::Timestamp(_) => Some(DataType::Timestamp),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Scalar from a JSON row field. Integers in a column named `timestamp`
    /// are read as epoch milliseconds; arrays and objects have no cell form.
    pub fn from_json(json: &serde_json::Value, column: &str) -> Self {
        use serde_json::Value as Json;

        match json {
            Json::Bool(b) => Self::Bool(*b),
            Json::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) if column == "timestamp" => Self::Timestamp(i),
                (Some(i), _) => Self::Int64(i),
                (None, Some(f)) => Self::Float64(f),
                (None, None) => Self::Null,
            },
            Json::String(s) => Self::String(s.clone()),
            Json::Null | Json::Array(_) | Json::Object(_) => Self::Null,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => (*b).into(),
            Self::Int64(i) | Self::Timestamp(i) => (*i).into(),
            // NaN and infinities have no JSON form
            Self::Float64(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::String(s) => s.as_str().into(),
        }
    }
}

/// Integers and timestamps compare by raw value; floats compare bitwise so
/// that a NaN cell equals itself when whole tables are compared.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Float64(a), Self::Float64(b)) => a.to_bits() == b.to_bits(),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Int64(a) | Self::Timestamp(a), Self::Int64(b) | Self::Timestamp(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int64(i) | Self::Timestamp(i) => write!(f, "{}", i),
            Self::Float64(v) => write!(f, "{}", v),
            Self::String(s) => f.write_str(s),
        }
    }
}
