//! Static severity mapping and confidence helpers shared by all detectors,
//! so findings from different detectors rank comparably.

use crate::model::{IssueKind, Severity};

/// Fixed high baseline for deterministic rule matches.
pub const BASE_RULE_CONFIDENCE: f32 = 0.9;

/// Boost applied per additional corroborating signal.
pub const CORROBORATION_BOOST: f32 = 0.05;

/// The severity of an issue kind is static and shared across detectors.
pub fn severity_for(kind: IssueKind) -> Severity {
    match kind {
        IssueKind::MissingPartitionKey => Severity::Critical,
        IssueKind::FullScanFilter => Severity::High,
        IssueKind::OversizedBatch => Severity::Medium,
        IssueKind::UnpreparedStatement => Severity::Low,
    }
}

/// Boost a base confidence by the number of corroborating signals, capped
/// at 1.0.
///
/// ```
/// use cqlint::detect::severity::boosted_confidence;
///
/// assert_eq!(boosted_confidence(0.9, 0), 0.9);
/// assert!((boosted_confidence(0.9, 1) - 0.95).abs() < 1e-6);
/// assert_eq!(boosted_confidence(0.9, 5), 1.0);
/// ```
pub fn boosted_confidence(base: f32, signals: usize) -> f32 {
    (base + signals as f32 * CORROBORATION_BOOST).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_map_is_stable() {
        assert_eq!(severity_for(IssueKind::MissingPartitionKey), Severity::Critical);
        assert_eq!(severity_for(IssueKind::FullScanFilter), Severity::High);
        assert_eq!(severity_for(IssueKind::OversizedBatch), Severity::Medium);
        assert_eq!(severity_for(IssueKind::UnpreparedStatement), Severity::Low);
    }

    #[test]
    fn confidence_caps_at_one() {
        assert_eq!(boosted_confidence(0.95, 3), 1.0);
        assert!((boosted_confidence(0.8, 2) - 0.9).abs() < 1e-6);
    }
}
