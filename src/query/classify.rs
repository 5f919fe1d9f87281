//! Maps raw database error text to a category with remediation hints

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;

/// Classified failure kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorCategory {
    SyntaxError,
    TableNotFound { table: Option<String> },
    ColumnNotFound { column: Option<String> },
    Unknown,
}

impl ErrorCategory {
    pub fn message(&self) -> &'static str {
        match self {
            ErrorCategory::SyntaxError => "SQL syntax error detected",
            ErrorCategory::TableNotFound { .. } => "Table not found in database",
            ErrorCategory::ColumnNotFound { .. } => "Column not found in table",
            ErrorCategory::Unknown => "Unknown error occurred",
        }
    }

    /// Remediation hints, most useful first
    pub fn suggestions(&self) -> &'static [&'static str] {
        match self {
            ErrorCategory::SyntaxError => &[
                "Check for missing commas or semicolons",
                "Verify column and table names",
                "Ensure quotes are properly closed",
            ],
            ErrorCategory::TableNotFound { .. } => &[
                "Verify table name spelling",
                "Check if table has been loaded",
                "Use SHOW TABLES to list available tables",
            ],
            ErrorCategory::ColumnNotFound { .. } => &[
                "Verify column name spelling",
                "Use DESCRIBE table_name to see columns",
                "Check for case sensitivity",
            ],
            ErrorCategory::Unknown => &["Check query syntax", "Verify table and column names"],
        }
    }

    /// Short tag used in logs and API payloads
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCategory::SyntaxError => "syntax_error",
            ErrorCategory::TableNotFound { .. } => "table_not_found",
            ErrorCategory::ColumnNotFound { .. } => "column_not_found",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

struct Patterns {
    column: [Regex; 3],
    table: [Regex; 3],
    syntax: Regex,
    column_name: Regex,
    table_name: Regex,
    quoted_missing: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |pattern: &str| Regex::new(pattern).expect("valid classifier regex");
        Patterns {
            column: [
                re(r"(?i)\bcolumn\b.*\bdoes not exist\b"),
                re(r"(?i)binder error.*\bcolumn\b"),
                re(r"(?i)referenced column\b.*\bnot found\b"),
            ],
            table: [
                re(r"(?i)\btable\b.*\bdoes not exist\b"),
                re(r#"(?i)["'`][^"'`]+["'`]\s+does not exist\b"#),
                re(r"(?i)catalog error.*\btable\b"),
            ],
            syntax: re(r"(?i)syntax error|parser error"),
            column_name: re(r#"(?i)\bcolumn\s+(?:with name\s+)?["'`]?([A-Za-z_][\w.]*)"#),
            table_name: re(r#"(?i)\btable\s+(?:with name\s+)?["'`]?([A-Za-z_][\w.]*)"#),
            quoted_missing: re(r#"["'`]([^"'`]+)["'`]\s+does not exist"#),
        }
    })
}

const NOT_IDENTIFIERS: &[&str] = &["not", "does", "with", "name", "in", "of"];

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|name| !NOT_IDENTIFIERS.contains(&name.to_ascii_lowercase().as_str()))
}

/// Classify a raw error message. The first matching rule wins:
/// column, then table, then syntax, then unknown.
pub fn categorize(raw_error: &str) -> ErrorCategory {
    let p = patterns();

    if p.column.iter().any(|re| re.is_match(raw_error)) {
        return ErrorCategory::ColumnNotFound {
            column: capture(&p.column_name, raw_error),
        };
    }

    if p.table.iter().any(|re| re.is_match(raw_error)) {
        let table = capture(&p.table_name, raw_error)
            .or_else(|| capture(&p.quoted_missing, raw_error));
        return ErrorCategory::TableNotFound { table };
    }

    if p.syntax.is_match(raw_error) {
        return ErrorCategory::SyntaxError;
    }

    ErrorCategory::Unknown
}

/// Follow-up hint appended to a failed query's error text
pub fn suggest_correction(_original_query: &str, category: &ErrorCategory) -> Option<String> {
    match category {
        ErrorCategory::TableNotFound { .. } => Some(
            "-- Did you mean a different table?\n-- Use SHOW TABLES to see available tables"
                .to_string(),
        ),
        ErrorCategory::ColumnNotFound { column: Some(name) } => Some(format!(
            "-- Column '{}' not found\n-- Use DESCRIBE table_name to see available columns",
            name
        )),
        _ => None,
    }
}

/// A classified failure ready for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnosis {
    pub category: ErrorCategory,
    /// Raw collaborator message
    pub original: String,
    pub correction: Option<String>,
}

impl Diagnosis {
    pub fn new(query: &str, raw_error: &str) -> Self {
        let category = categorize(raw_error);
        let correction = suggest_correction(query, &category);
        Self {
            category,
            original: raw_error.to_string(),
            correction,
        }
    }
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}\nSuggestions:", self.category.message(), self.original)?;
        for suggestion in self.category.suggestions() {
            write!(f, "\n  • {}", suggestion)?;
        }
        if let Some(correction) = &self.correction {
            write!(f, "\n{}", correction)?;
        }
        Ok(())
    }
}
