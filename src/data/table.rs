use super::column::Column;
use super::value::{DataType, Value};

/// Tabular query result: named columns of equal length
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    names: Vec<String>,
    columns: Vec<Column>,
}

impl Table {
    /// Table with no columns and no rows
    pub fn empty() -> Self {
        Self::default()
    }

    /// Zero-row table with the given schema
    pub fn with_schema<S: Into<String>>(schema: impl IntoIterator<Item = (S, DataType)>) -> Self {
        let (names, columns) = schema
            .into_iter()
            .map(|(name, dtype)| (name.into(), Column::new(dtype)))
            .unzip();
        Self { names, columns }
    }

    /// Build from named columns, which must all have the same length
    pub fn from_columns<S: Into<String>>(
        columns: impl IntoIterator<Item = (S, Column)>,
    ) -> Result<Self, TableError> {
        let (names, columns): (Vec<String>, Vec<Column>) = columns
            .into_iter()
            .map(|(name, col)| (name.into(), col))
            .unzip();

        if let Some(first) = columns.first() {
            let expected = first.len();
            for (name, col) in names.iter().zip(&columns) {
                if col.len() != expected {
                    return Err(TableError::LengthMismatch {
                        column: name.clone(),
                        expected,
                        found: col.len(),
                    });
                }
            }
        }

        Ok(Self { names, columns })
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn schema(&self) -> Vec<(String, DataType)> {
        self.names
            .iter()
            .cloned()
            .zip(self.columns.iter().map(Column::data_type))
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| &self.columns[idx])
    }

    pub fn row(&self, index: usize) -> Vec<Value> {
        self.columns.iter().map(|c| c.get(index)).collect()
    }

    pub fn rows(&self) -> impl Iterator<Item = Vec<Value>> + '_ {
        (0..self.num_rows()).map(move |i| self.row(i))
    }

    /// Rows `[offset, offset + len)` with the same schema
    pub fn slice(&self, offset: usize, len: usize) -> Table {
        Table {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.slice(offset, len)).collect(),
        }
    }

    /// Concatenate tables row-wise. The schema comes from the first table;
    /// later tables are matched by position.
    pub fn concat<'a>(tables: impl IntoIterator<Item = &'a Table>) -> Table {
        let mut tables = tables.into_iter();
        let Some(first) = tables.next() else {
            return Table::empty();
        };

        let mut out = first.clone();
        for table in tables {
            for (dst, src) in out.columns.iter_mut().zip(&table.columns) {
                dst.extend_from(src);
            }
        }
        out
    }

    /// Sum of per-column buffer sizes
    pub fn size_bytes(&self) -> u64 {
        self.columns.iter().map(|c| c.size_bytes() as u64).sum()
    }

    /// Build a table from JSON objects. Columns appear in first-seen key order;
    /// each column's type merges the types of its non-null values.
    pub fn from_json_rows(rows: &[serde_json::Map<String, serde_json::Value>]) -> Table {
        let mut schema: Vec<(String, Option<DataType>)> = Vec::new();
        for row in rows {
            for (key, json) in row {
                let dtype = Value::from_json(json, key).data_type();
                match schema.iter_mut().find(|(name, _)| name == key) {
                    Some((_, slot)) => {
                        *slot = match (*slot, dtype) {
                            (Some(a), Some(b)) => Some(a.merge(&b)),
                            (a, b) => a.or(b),
                        };
                    }
                    None => schema.push((key.clone(), dtype)),
                }
            }
        }

        let mut table = Table::with_schema(
            schema
                .into_iter()
                .map(|(name, dtype)| (name, dtype.unwrap_or(DataType::String))),
        );
        for row in rows {
            for (name, col) in table.names.iter().zip(table.columns.iter_mut()) {
                let value = row
                    .get(name)
                    .map(|json| Value::from_json(json, name))
                    .unwrap_or(Value::Null);
                col.push(&value);
            }
        }
        table
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("Column '{column}' has {found} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },

}
