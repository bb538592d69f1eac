//! Query-text heuristics shared by the structural extractor, the fallback
//! scanner and the rule detectors.

use crate::model::QueryVerb;
use regex::Regex;
use std::sync::OnceLock;

fn allow_filtering_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bALLOW\s+FILTERING\b").unwrap())
}

fn query_start_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(SELECT\s+.+?\s+FROM\s|INSERT\s+INTO\s|UPDATE\s+[\w.]+\s+SET\s|DELETE\s+FROM\s|BEGIN\s+(?:UNLOGGED\s+|COUNTER\s+)?BATCH\b)",
        )
        .unwrap()
    })
}

fn batch_statement_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(INSERT\s+INTO|UPDATE\s|DELETE\s+FROM)").unwrap())
}

fn bind_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\?|%s|%\(\w+\)s|:\w+").unwrap())
}

/// Collapse runs of whitespace into single spaces and trim. Multi-line
/// query literals reassemble into one logical line this way.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !last_space && !out.is_empty() {
                out.push(' ');
                last_space = true;
            }
        } else {
            out.push(ch);
            last_space = false;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Whether a reconstructed string looks like a query worth a CallSite.
pub fn is_query_text(text: &str) -> bool {
    infer_verb(text) != QueryVerb::Unknown
}

/// Infer the query verb from the leading keyword.
pub fn infer_verb(text: &str) -> QueryVerb {
    let trimmed = text.trim_start();
    let upper: String = trimmed
        .chars()
        .take(16)
        .collect::<String>()
        .to_ascii_uppercase();
    if upper.starts_with("SELECT ") || upper.starts_with("SELECT\n") {
        QueryVerb::Select
    } else if upper.starts_with("INSERT ") {
        QueryVerb::Insert
    } else if upper.starts_with("UPDATE ") {
        QueryVerb::Update
    } else if upper.starts_with("DELETE ") || upper.starts_with("DELETE\n") {
        QueryVerb::Delete
    } else if upper.starts_with("BEGIN BATCH")
        || upper.starts_with("BEGIN UNLOGGED")
        || upper.starts_with("BEGIN COUNTER")
    {
        QueryVerb::Batch
    } else {
        QueryVerb::Unknown
    }
}

/// Position of the first query keyword inside a raw line, if any.
pub fn find_query_start(line: &str) -> Option<usize> {
    query_start_re().find(line).map(|m| m.start())
}

pub fn has_allow_filtering(query: &str) -> bool {
    allow_filtering_re().is_match(query)
}

pub fn has_select_star(query: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bSELECT\s+\*").unwrap())
        .is_match(query)
}

/// The WHERE clause body, up to ALLOW FILTERING or clause-ending keywords.
pub fn where_clause(query: &str) -> Option<&str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)\bWHERE\b(.*?)(?:\bALLOW\s+FILTERING\b|\bLIMIT\b|\bORDER\s+BY\b|\bGROUP\s+BY\b|;|$)")
            .unwrap()
    });
    re.captures(query)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str())
}

/// Whether a WHERE clause carries at least one equality or IN predicate,
/// the only predicate shapes that can pin a partition.
pub fn has_key_equality(clause: &str) -> bool {
    let bytes = clause.as_bytes();
    for (idx, &b) in bytes.iter().enumerate() {
        if b == b'=' {
            // Exclude >=, <=, !=, and == continuation.
            let prev = idx.checked_sub(1).map(|i| bytes[i]);
            if matches!(prev, Some(b'>') | Some(b'<') | Some(b'!') | Some(b'=')) {
                continue;
            }
            if bytes.get(idx + 1) == Some(&b'=') {
                continue;
            }
            return true;
        }
    }
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bIN\s*\(").unwrap())
        .is_match(clause)
}

/// Statement count of a batch, when it can be counted statically.
///
/// Returns `None` for truncated batches (no APPLY BATCH) and for
/// dynamically assembled ones; those are the semantic detector's cases.
pub fn batch_statement_count(query: &str, dynamic: bool) -> Option<usize> {
    if dynamic {
        return None;
    }
    static END_RE: OnceLock<Regex> = OnceLock::new();
    let end = END_RE.get_or_init(|| Regex::new(r"(?i)\bAPPLY\s+BATCH\b").unwrap());
    let end_match = end.find(query)?;
    let body = &query[..end_match.start()];
    Some(batch_statement_re().find_iter(body).count())
}

pub fn has_bind_markers(query: &str) -> bool {
    bind_marker_re().is_match(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(
            normalize("SELECT *\n   FROM users\n\tWHERE id = ?"),
            "SELECT * FROM users WHERE id = ?"
        );
    }

    #[test]
    fn verb_inference() {
        assert_eq!(infer_verb("SELECT * FROM t"), QueryVerb::Select);
        assert_eq!(infer_verb("  insert into t (a) VALUES (1)"), QueryVerb::Insert);
        assert_eq!(infer_verb("UPDATE t SET a = 1"), QueryVerb::Update);
        assert_eq!(infer_verb("DELETE FROM t WHERE id = 1"), QueryVerb::Delete);
        assert_eq!(infer_verb("BEGIN BATCH INSERT ..."), QueryVerb::Batch);
        assert_eq!(infer_verb("BEGIN UNLOGGED BATCH ..."), QueryVerb::Batch);
        assert_eq!(infer_verb("CREATE TABLE t (id int)"), QueryVerb::Unknown);
        assert_eq!(infer_verb("hello world"), QueryVerb::Unknown);
    }

    #[test]
    fn allow_filtering_detection() {
        assert!(has_allow_filtering("SELECT * FROM t ALLOW FILTERING"));
        assert!(has_allow_filtering("select * from t allow   filtering"));
        assert!(!has_allow_filtering("SELECT * FROM allow_filtering_log"));
    }

    #[test]
    fn where_clause_extraction() {
        let clause = where_clause("SELECT * FROM users WHERE email = ? ALLOW FILTERING").unwrap();
        assert_eq!(clause.trim(), "email = ?");
        assert!(where_clause("SELECT * FROM users").is_none());
    }

    #[test]
    fn key_equality_ignores_range_operators() {
        assert!(has_key_equality("id = ?"));
        assert!(has_key_equality("id IN (1, 2)"));
        assert!(!has_key_equality("ts >= ? AND ts <= ?"));
        assert!(!has_key_equality("token(id) > token(?)"));
    }

    #[test]
    fn batch_counting() {
        let mut q = String::from("BEGIN BATCH ");
        for i in 0..150 {
            q.push_str(&format!("INSERT INTO t (id) VALUES ({i}); "));
        }
        q.push_str("APPLY BATCH");
        assert_eq!(batch_statement_count(&q, false), Some(150));
        // Dynamically built or truncated batches cannot be counted.
        assert_eq!(batch_statement_count(&q, true), None);
        assert_eq!(batch_statement_count("BEGIN BATCH INSERT INTO t", false), None);
    }

    #[test]
    fn bind_marker_detection() {
        assert!(has_bind_markers("SELECT * FROM t WHERE id = ?"));
        assert!(has_bind_markers("SELECT * FROM t WHERE id = %s"));
        assert!(has_bind_markers("SELECT * FROM t WHERE id = :id"));
        assert!(!has_bind_markers("SELECT * FROM t WHERE id = 42"));
    }
}
