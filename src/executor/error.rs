use crate::db::DatabaseError;
use crate::query::{Diagnosis, ErrorCategory};

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The database rejected or failed the query
    #[error("{diagnosis}")]
    Execution {
        diagnosis: Diagnosis,
        #[source]
        source: DatabaseError,
    },
}

impl QueryError {
    /// Classify a database failure for `sql`
    pub fn execution(sql: &str, source: DatabaseError) -> Self {
        QueryError::Execution {
            diagnosis: Diagnosis::new(sql, source.message()),
            source,
        }
    }

    pub fn category(&self) -> &ErrorCategory {
        match self {
            QueryError::Execution { diagnosis, .. } => &diagnosis.category,
        }
    }

    pub fn diagnosis(&self) -> &Diagnosis {
        match self {
            QueryError::Execution { diagnosis, .. } => diagnosis,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_error_text_embeds_suggestions() {
        let err = QueryError::execution(
            "SELECT * FROM users",
            DatabaseError::new("Table 'users' does not exist"),
        );
        let text = err.to_string();
        assert!(text.contains("Table not found"));
        assert!(text.contains("Suggestions:"));
        assert!(matches!(err.category(), ErrorCategory::TableNotFound { .. }));
        assert_eq!(err.source().unwrap().to_string(), "Table 'users' does not exist");
    }
}
