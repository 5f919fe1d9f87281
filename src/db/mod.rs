//! Boundary to the embedded database connection.
//!
//! The executor only needs two calls: open a result for a query and pull
//! bounded chunks from it until an empty chunk signals the end.

pub mod memory;

pub use memory::MemoryDatabase;

use crate::data::Table;

/// Raw failure reported by the database, kept verbatim for classification
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct DatabaseError {
    message: String,
}

impl DatabaseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A database connection able to run one query at a time per handle
pub trait Database: Send + Sync {
    fn execute(&self, sql: &str) -> Result<Box<dyn ResultHandle>, DatabaseError>;
}

/// Open result of a query
pub trait ResultHandle: Send {
    /// Up to `max_rows` further rows. A zero-row table means the result is exhausted.
    fn fetch_chunk(&mut self, max_rows: u32) -> Result<Table, DatabaseError>;
}

/// Handle over an already materialized table
#[derive(Debug)]
pub struct TableHandle {
    table: Table,
    offset: usize,
}

impl TableHandle {
    pub fn new(table: Table) -> Self {
        Self { table, offset: 0 }
    }
}

impl ResultHandle for TableHandle {
    fn fetch_chunk(&mut self, max_rows: u32) -> Result<Table, DatabaseError> {
        let remaining = self.table.num_rows().saturating_sub(self.offset);
        let take = remaining.min(max_rows.max(1) as usize);
        let chunk = self.table.slice(self.offset, take);
        self.offset += take;
        Ok(chunk)
    }
}
