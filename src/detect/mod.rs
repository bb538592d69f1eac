use crate::config::Config;
use crate::model::{CallSite, Finding};
use std::collections::BTreeMap;
use std::sync::Arc;

pub mod rules;
pub mod semantic;
pub mod severity;

/// Output of one detector over one call-site.
#[derive(Debug, Default)]
pub struct Detection {
    pub findings: Vec<Finding>,
    /// Set when the detector's signal was lost (semantic retries
    /// exhausted). Non-fatal: other detectors still apply.
    pub degraded: bool,
}

impl Detection {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn of(finding: Finding) -> Self {
        Self {
            findings: vec![finding],
            degraded: false,
        }
    }

    pub fn degraded() -> Self {
        Self {
            findings: Vec::new(),
            degraded: true,
        }
    }
}

/// The detector capability: one call-site in, zero or more findings out.
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Expensive detectors are skipped once a file's soft time limit has
    /// passed; rule detectors always run.
    fn is_expensive(&self) -> bool {
        false
    }

    fn detect(&self, site: &CallSite) -> Detection;
}

struct RegistryEntry {
    name: String,
    enabled: bool,
    #[allow(dead_code)]
    config: BTreeMap<String, String>,
    detector: Box<dyn Detector>,
}

/// Result of running the registry over one call-site.
#[derive(Debug, Default)]
pub struct RegistryOutput {
    pub findings: Vec<Finding>,
    pub degraded: Vec<String>,
}

/// Pluggable detector set keyed by stable names, built from configuration
/// at startup.
pub struct Registry {
    entries: Vec<RegistryEntry>,
}

impl Registry {
    fn entry(
        name: &str,
        enabled: bool,
        config: BTreeMap<String, String>,
        detector: Box<dyn Detector>,
    ) -> RegistryEntry {
        RegistryEntry {
            name: name.to_string(),
            enabled,
            config,
            detector,
        }
    }

    /// The rule-based detector set, configured from the environment.
    pub fn rules_only() -> Self {
        let config = Config::get();
        let mut batch_config = BTreeMap::new();
        batch_config.insert("threshold".to_string(), config.batch_threshold.to_string());
        Self {
            entries: vec![
                Self::entry(
                    "full_scan_filter",
                    true,
                    BTreeMap::new(),
                    Box::new(rules::FullScanFilterDetector),
                ),
                Self::entry(
                    "missing_partition_key",
                    true,
                    BTreeMap::new(),
                    Box::new(rules::MissingPartitionKeyDetector),
                ),
                Self::entry(
                    "oversized_batch",
                    true,
                    batch_config,
                    Box::new(rules::OversizedBatchDetector {
                        threshold: config.batch_threshold,
                    }),
                ),
                Self::entry(
                    "unprepared_statement",
                    true,
                    BTreeMap::new(),
                    Box::new(rules::UnpreparedStatementDetector),
                ),
            ],
        }
    }

    /// Rule detectors plus the cache-backed semantic detector.
    pub fn with_semantic(
        cache: Arc<semantic::SemanticCache>,
        service: Arc<dyn semantic::ReasoningService>,
    ) -> Self {
        let mut registry = Self::rules_only();
        registry.entries.push(Self::entry(
            "semantic",
            true,
            BTreeMap::new(),
            Box::new(semantic::SemanticDetector::new(cache, service)),
        ));
        registry
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) {
        for entry in &mut self.entries {
            if entry.name == name {
                entry.enabled = enabled;
            }
        }
    }

    pub fn detector_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Run every enabled detector over one call-site. When `skip_expensive`
    /// is set (soft deadline passed), semantic detectors are not consulted.
    pub fn detect(&self, site: &CallSite, skip_expensive: bool) -> RegistryOutput {
        let mut output = RegistryOutput::default();
        for entry in &self.entries {
            if !entry.enabled {
                continue;
            }
            if skip_expensive && entry.detector.is_expensive() {
                continue;
            }
            let detection = entry.detector.detect(site);
            output.findings.extend(detection.findings);
            if detection.degraded {
                output.degraded.push(entry.name.clone());
            }
        }
        output
    }
}
