//! Line-oriented fallback scanner.
//!
//! Used for every language without a structural extractor, and for files
//! whose structural parse fails. A single malformed region never suppresses
//! detection in the rest of the file: each line is inspected independently
//! and multi-line literals are stitched back together heuristically.

use crate::extract::query;
use crate::model::{CallSite, QueryVerb};
use regex::Regex;
use std::collections::BTreeMap;

const MAX_CONTINUATION_LINES: usize = 100;

pub struct FallbackScanner {
    class_re: Regex,
    def_re: Regex,
    method_re: Regex,
    continuation_re: Regex,
    dynamic_re: Regex,
}

impl FallbackScanner {
    pub fn new() -> Self {
        Self {
            class_re: Regex::new(r"^\s*(?:public\s+|final\s+|abstract\s+)*class\s+(\w+)").unwrap(),
            def_re: Regex::new(r"^\s*(?:async\s+)?def\s+(\w+)").unwrap(),
            method_re: Regex::new(
                r"^\s*(?:public|private|protected)\s+(?:static\s+)?[\w<>\[\],\s]+?\s(\w+)\s*\(",
            )
            .unwrap(),
            // A continuation line of a string literal: starts with a quote
            // or with a CQL clause keyword.
            continuation_re: Regex::new(
                r#"(?i)^\s*["']|^\s*(AND|WHERE|FROM|VALUES|SET|ORDER|LIMIT|USING|IF|ALLOW|APPLY|INSERT|UPDATE|DELETE)\b"#,
            )
            .unwrap(),
            dynamic_re: Regex::new(
                r#""\s*\+|\+\s*"|'\s*\+|\+\s*'|\+=\s*["']|\.format\(|\bf["']|\$\{|%\s*\("#,
            )
            .unwrap(),
        }
    }

    pub fn scan(&self, file_path: &str, source: &str) -> Vec<CallSite> {
        let lines: Vec<&str> = source.lines().collect();
        let mut sites = Vec::new();
        let mut class: Option<String> = None;
        let mut method: Option<String> = None;

        let mut idx = 0;
        while idx < lines.len() {
            let line = lines[idx];
            if let Some(cap) = self.class_re.captures(line) {
                class = Some(cap[1].to_string());
                method = None;
            } else if let Some(cap) = self.def_re.captures(line) {
                method = Some(cap[1].to_string());
            } else if let Some(cap) = self.method_re.captures(line) {
                method = Some(cap[1].to_string());
            }

            let Some(start) = query::find_query_start(line) else {
                idx += 1;
                continue;
            };

            let (raw, consumed) = self.capture_query(&lines, idx, start);
            let text = strip_literal_noise(&raw);
            let normalized = query::normalize(&text);
            let verb = query::infer_verb(&normalized);
            if verb == QueryVerb::Unknown {
                idx += 1;
                continue;
            }

            let dynamic = self.dynamic_re.is_match(&raw);
            let mut context = BTreeMap::new();
            context.insert("origin".to_string(), "line-scan".to_string());
            context.insert(
                "snippet".to_string(),
                truncate(line.trim(), 160).to_string(),
            );
            if dynamic {
                context.insert("dynamic_construction".to_string(), "true".to_string());
                context.insert(
                    "bind_markers".to_string(),
                    query::has_bind_markers(&normalized).to_string(),
                );
            }

            sites.push(CallSite {
                file_path: file_path.to_string(),
                line: (idx + 1) as i64,
                method: method.clone(),
                class: class.clone(),
                query: normalized,
                verb,
                context,
            });

            idx += consumed.max(1);
        }
        sites
    }

    /// Capture a query starting on `lines[start_idx]` at byte offset
    /// `start`, stitching continuation lines back together. Returns the raw
    /// captured text and the number of lines consumed.
    fn capture_query(&self, lines: &[&str], start_idx: usize, start: usize) -> (String, usize) {
        let first = &lines[start_idx][start..];
        let mut captured = String::from(first);
        let mut consumed = 1;

        let is_batch = query::infer_verb(first.trim_start()) == QueryVerb::Batch
            || first.to_ascii_uppercase().contains("BEGIN BATCH");

        while start_idx + consumed < lines.len() && consumed < MAX_CONTINUATION_LINES {
            if is_batch {
                if captured.to_ascii_uppercase().contains("APPLY BATCH") {
                    break;
                }
            } else if !self.continuation_re.is_match(lines[start_idx + consumed]) {
                break;
            }
            captured.push(' ');
            captured.push_str(lines[start_idx + consumed].trim());
            consumed += 1;
        }
        (captured, consumed)
    }
}

impl Default for FallbackScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Remove quoting and statement-assembly noise so rule matching sees only
/// the literal query text.
fn strip_literal_noise(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '"' | '\'' | '`' | '\\' => out.push(' '),
            _ => out.push(ch),
        }
    }
    // Drop a trailing call-syntax tail such as `);` left on the last line.
    let trimmed = out.trim_end();
    let trimmed = trimmed.trim_end_matches(|c| matches!(c, ')' | ';' | ','));
    trimmed.to_string()
}

fn truncate(value: &str, max_bytes: usize) -> &str {
    if value.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes;
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}
