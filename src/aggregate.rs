//! Confidence & severity aggregation.
//!
//! Findings are grouped by (call-site, issue kind); when two detectors flag
//! the same kind on the same site, the highest-confidence finding survives
//! and evidence lists merge. Output ordering is deterministic: severity
//! descending, then source line ascending.

use crate::model::{AnalysisResult, Finding};
use std::collections::BTreeMap;

/// Resolve duplicate findings across detectors for one file.
pub fn merge_findings(findings: Vec<Finding>) -> Vec<Finding> {
    let mut merged: Vec<Finding> = Vec::new();
    let mut index: BTreeMap<(i64, &'static str), usize> = BTreeMap::new();

    for finding in findings {
        let key = (finding.site.line, finding.kind.as_str());
        match index.get(&key) {
            Some(&slot) => {
                let existing = &mut merged[slot];
                let evidence: Vec<String> = finding
                    .evidence
                    .iter()
                    .filter(|item| !existing.evidence.contains(item))
                    .cloned()
                    .collect();
                if finding.confidence > existing.confidence {
                    let mut winner = finding;
                    for item in &existing.evidence {
                        if !winner.evidence.contains(item) {
                            winner.evidence.push(item.clone());
                        }
                    }
                    merged[slot] = winner;
                } else {
                    existing.evidence.extend(evidence);
                }
            }
            None => {
                index.insert(key, merged.len());
                merged.push(finding);
            }
        }
    }
    merged
}

/// Build the per-file analysis result with deterministic ordering and
/// severity counts.
pub fn build_result(
    file_path: &str,
    call_sites: usize,
    findings: Vec<Finding>,
    degraded_detectors: Vec<String>,
) -> AnalysisResult {
    let mut findings = merge_findings(findings);
    findings.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.site.line.cmp(&b.site.line))
    });

    let mut severity_counts: BTreeMap<String, usize> = BTreeMap::new();
    for finding in &findings {
        *severity_counts
            .entry(finding.severity.as_str().to_string())
            .or_insert(0) += 1;
    }

    let mut degraded = degraded_detectors;
    degraded.sort();
    degraded.dedup();

    AnalysisResult {
        file_path: file_path.to_string(),
        call_sites,
        findings,
        severity_counts,
        degraded_detectors: degraded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CallSite, IssueKind, QueryVerb, Severity};
    use std::collections::BTreeMap as Map;

    fn finding(line: i64, kind: IssueKind, severity: Severity, confidence: f32, detector: &str) -> Finding {
        Finding {
            detector: detector.to_string(),
            kind,
            severity,
            confidence,
            message: format!("{} at line {line}", kind.as_str()),
            recommendation: "fix it".to_string(),
            evidence: vec![format!("{detector} evidence")],
            site: CallSite {
                file_path: "app/repo.py".to_string(),
                line,
                method: None,
                class: None,
                query: "SELECT * FROM t".to_string(),
                verb: QueryVerb::Select,
                context: Map::new(),
            },
        }
    }

    #[test]
    fn duplicate_kind_keeps_highest_confidence_and_merges_evidence() {
        let merged = merge_findings(vec![
            finding(10, IssueKind::FullScanFilter, Severity::High, 0.9, "rules"),
            finding(10, IssueKind::FullScanFilter, Severity::High, 0.95, "semantic"),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].detector, "semantic");
        assert!((merged[0].confidence - 0.95).abs() < 1e-6);
        assert!(merged[0].evidence.contains(&"rules evidence".to_string()));
        assert!(merged[0].evidence.contains(&"semantic evidence".to_string()));
    }

    #[test]
    fn different_lines_stay_distinct() {
        let merged = merge_findings(vec![
            finding(10, IssueKind::FullScanFilter, Severity::High, 0.9, "rules"),
            finding(20, IssueKind::FullScanFilter, Severity::High, 0.9, "rules"),
        ]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn result_orders_by_severity_then_line() {
        let result = build_result(
            "app/repo.py",
            3,
            vec![
                finding(30, IssueKind::UnpreparedStatement, Severity::Low, 0.7, "rules"),
                finding(20, IssueKind::MissingPartitionKey, Severity::Critical, 0.9, "rules"),
                finding(10, IssueKind::OversizedBatch, Severity::Medium, 0.9, "rules"),
                finding(5, IssueKind::FullScanFilter, Severity::High, 0.9, "rules"),
            ],
            vec![],
        );
        let severities: Vec<Severity> = result.findings.iter().map(|f| f.severity).collect();
        assert_eq!(
            severities,
            vec![Severity::Critical, Severity::High, Severity::Medium, Severity::Low]
        );
        assert_eq!(result.severity_counts.get("critical"), Some(&1));
        assert_eq!(result.severity_counts.get("low"), Some(&1));
    }

    #[test]
    fn empty_input_is_empty_output() {
        let result = build_result("app/empty.py", 0, vec![], vec![]);
        assert_eq!(result.call_sites, 0);
        assert!(result.findings.is_empty());
        assert!(result.severity_counts.is_empty());
    }
}
