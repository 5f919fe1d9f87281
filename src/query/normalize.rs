//! Query text normalization for cache keys and shape signatures

use regex::Regex;
use std::sync::OnceLock;

fn string_literal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"'(?:[^']|'')*'").expect("valid literal regex"))
}

/// Single- or double-quoted span, with doubled quotes as escapes
fn quoted_span() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"'(?:[^']|'')*'|"(?:[^"]|"")*""#).expect("valid quoted span regex")
    })
}

fn whitespace_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace regex"))
}

fn number_literal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d+(?:\.\d+)?\b").expect("valid number regex"))
}

fn placeholder_list() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(\s*\?(?:\s*,\s*\?)*\s*\)").expect("valid list regex"))
}

/// Collapse runs of whitespace to single spaces and trim. Case is untouched,
/// and quoted literals and identifiers are copied verbatim.
pub fn normalize_whitespace(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut last = 0;
    for span in quoted_span().find_iter(sql) {
        out.push_str(&whitespace_run().replace_all(&sql[last..span.start()], " "));
        out.push_str(span.as_str());
        last = span.end();
    }
    out.push_str(&whitespace_run().replace_all(&sql[last..], " "));
    out.trim().to_string()
}

/// Signature grouping queries that differ only in literal values.
///
/// String and numeric literals become `?`, literal lists collapse to `(?)`,
/// keywords and identifiers are lowercased.
pub fn shape_signature(sql: &str) -> String {
    let without_strings = string_literal().replace_all(sql, "?");
    let without_numbers = number_literal().replace_all(&without_strings, "?");
    let collapsed = placeholder_list().replace_all(&without_numbers, "(?)");
    normalize_whitespace(&collapsed.to_lowercase())
        .trim_end_matches(';')
        .trim_end()
        .to_string()
}

/// Shorten query text for log lines
pub fn truncate_query(sql: &str, max_chars: usize) -> String {
    let flat = normalize_whitespace(sql);
    match flat.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(
            normalize_whitespace("  SELECT   *\n\tFROM events  "),
            "SELECT * FROM events"
        );
    }

    #[test]
    fn test_normalize_whitespace_keeps_quoted_text() {
        assert_eq!(
            normalize_whitespace("SELECT  *  FROM users\n WHERE name = 'a  b'"),
            "SELECT * FROM users WHERE name = 'a  b'"
        );
        assert_eq!(
            normalize_whitespace(r#"SELECT   "first  name" FROM  t WHERE x = 'it''s  here'"#),
            r#"SELECT "first  name" FROM t WHERE x = 'it''s  here'"#
        );
    }

    #[test]
    fn test_shape_signature_strips_literals() {
        let a = shape_signature("SELECT * FROM users WHERE id = 42 AND name = 'bob'");
        let b = shape_signature("select *  from users where id = 7 and name = 'it''s'");
        assert_eq!(a, b);
        assert_eq!(a, "select * from users where id = ? and name = ?");
    }

    #[test]
    fn test_shape_signature_keeps_identifiers() {
        assert_ne!(
            shape_signature("SELECT * FROM table1"),
            shape_signature("SELECT * FROM table2")
        );
        assert_eq!(
            shape_signature("SELECT * FROM t WHERE x IN (1, 2, 3);"),
            "select * from t where x in (?)"
        );
    }

    #[test]
    fn test_truncate_query() {
        assert_eq!(truncate_query("SELECT 1", 100), "SELECT 1");
        assert_eq!(truncate_query("SELECT  *  FROM events", 8), "SELECT *...");
    }
}
