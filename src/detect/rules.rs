//! Rule-based detectors: deterministic pattern matches over one call-site.

use crate::detect::severity::{boosted_confidence, severity_for, BASE_RULE_CONFIDENCE};
use crate::detect::{Detection, Detector};
use crate::extract::query;
use crate::model::{CallSite, Finding, IssueKind, QueryVerb};

fn finding(
    detector: &str,
    kind: IssueKind,
    confidence: f32,
    message: String,
    recommendation: &str,
    evidence: Vec<String>,
    site: &CallSite,
) -> Finding {
    Finding {
        detector: detector.to_string(),
        kind,
        severity: severity_for(kind),
        confidence,
        message,
        recommendation: recommendation.to_string(),
        evidence,
        site: site.clone(),
    }
}

/// Flags queries that bypass indexed lookup with a full-scan filter clause.
pub struct FullScanFilterDetector;

impl Detector for FullScanFilterDetector {
    fn name(&self) -> &'static str {
        "full_scan_filter"
    }

    fn detect(&self, site: &CallSite) -> Detection {
        if !query::has_allow_filtering(&site.query) {
            return Detection::none();
        }
        let mut evidence = vec!["query carries ALLOW FILTERING".to_string()];
        let mut signals = 0;
        if query::has_select_star(&site.query) {
            evidence.push("unbounded column selection (SELECT *)".to_string());
            signals += 1;
        }
        let pinned = query::where_clause(&site.query)
            .map(query::has_key_equality)
            .unwrap_or(false);
        if !pinned {
            evidence.push("no equality predicate pins a partition".to_string());
            signals += 1;
        }
        Detection::of(finding(
            self.name(),
            IssueKind::FullScanFilter,
            boosted_confidence(BASE_RULE_CONFIDENCE, signals),
            format!(
                "{} query filters after a broad scan instead of an indexed lookup",
                site.verb.as_str()
            ),
            "Model the access pattern in the table's primary key, or add a materialized view, instead of ALLOW FILTERING",
            evidence,
            site,
        ))
    }
}

/// Flags SELECTs whose WHERE clause cannot pin a partition, which fan out
/// to every node in the cluster.
pub struct MissingPartitionKeyDetector;

impl Detector for MissingPartitionKeyDetector {
    fn name(&self) -> &'static str {
        "missing_partition_key"
    }

    fn detect(&self, site: &CallSite) -> Detection {
        if site.verb != QueryVerb::Select {
            return Detection::none();
        }
        let mut evidence = Vec::new();
        match query::where_clause(&site.query) {
            None => evidence.push("no WHERE clause".to_string()),
            Some(clause) => {
                if query::has_key_equality(clause) {
                    return Detection::none();
                }
                evidence.push("WHERE clause has no partition-pinning equality".to_string());
            }
        }
        let mut signals = 0;
        if query::has_allow_filtering(&site.query) {
            evidence.push("combined with ALLOW FILTERING".to_string());
            signals += 1;
        }
        Detection::of(finding(
            self.name(),
            IssueKind::MissingPartitionKey,
            boosted_confidence(0.85, signals),
            "SELECT without a partition key predicate scans every node".to_string(),
            "Restrict the query with an equality predicate on the partition key",
            evidence,
            site,
        ))
    }
}

/// Flags batches whose statically countable statement count exceeds the
/// configured threshold. Exactly one finding per batch, however it was
/// assembled.
pub struct OversizedBatchDetector {
    pub threshold: usize,
}

impl Detector for OversizedBatchDetector {
    fn name(&self) -> &'static str {
        "oversized_batch"
    }

    fn detect(&self, site: &CallSite) -> Detection {
        if site.verb != QueryVerb::Batch {
            return Detection::none();
        }
        let Some(count) = query::batch_statement_count(&site.query, site.is_dynamic()) else {
            // Uncountable batches are the semantic detector's case.
            return Detection::none();
        };
        if count <= self.threshold {
            return Detection::none();
        }
        let signals = usize::from(count > self.threshold * 2);
        Detection::of(finding(
            self.name(),
            IssueKind::OversizedBatch,
            boosted_confidence(BASE_RULE_CONFIDENCE, signals),
            format!(
                "batch contains {count} statements, above the threshold of {}",
                self.threshold
            ),
            "Split the batch into smaller chunks, or use parallel single-partition writes",
            vec![format!("counted {count} statements in the batch body")],
            site,
        ))
    }
}

/// Flags literal-built queries executed without a precompiled/bound form.
pub struct UnpreparedStatementDetector;

impl Detector for UnpreparedStatementDetector {
    fn name(&self) -> &'static str {
        "unprepared_statement"
    }

    fn detect(&self, site: &CallSite) -> Detection {
        if !site.is_dynamic() {
            return Detection::none();
        }
        let bound = site
            .context
            .get("bind_markers")
            .map(|v| v == "true")
            .unwrap_or_else(|| query::has_bind_markers(&site.query));
        if bound {
            return Detection::none();
        }
        let mut evidence = vec!["query text assembled dynamically".to_string()];
        let mut signals = 0;
        if matches!(
            site.verb,
            QueryVerb::Insert | QueryVerb::Update | QueryVerb::Delete
        ) {
            evidence.push("write-path statement re-parsed on every execution".to_string());
            signals += 1;
        }
        Detection::of(finding(
            self.name(),
            IssueKind::UnpreparedStatement,
            boosted_confidence(0.7, signals),
            "dynamically built query is executed without a prepared statement".to_string(),
            "Prepare the statement once and bind values at execution time",
            evidence,
            site,
        ))
    }
}
