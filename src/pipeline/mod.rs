//! Per-file analysis pipeline: extraction, detection, aggregation.

use crate::aggregate;
use crate::detect::Registry;
use crate::error::CoreError;
use crate::extract::{ExtractedFile, Extractor};
use crate::model::AnalysisResult;
use crate::pipeline::deadline::Deadline;
use std::path::Path;
use std::sync::Arc;

pub mod batch;
pub mod deadline;

pub struct Pipeline {
    registry: Arc<Registry>,
}

impl Pipeline {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Analyze one file end to end. Fails only when the file cannot be
    /// read or the hard time limit fires; malformed content never errors.
    pub fn analyze_file(
        &self,
        repo_root: &Path,
        rel_path: &str,
        deadline: &Deadline,
    ) -> Result<(AnalysisResult, ExtractedFile), CoreError> {
        let abs_path = repo_root.join(rel_path);
        let source =
            std::fs::read_to_string(&abs_path).map_err(|source| CoreError::Extraction {
                path: rel_path.to_string(),
                source,
            })?;
        self.analyze_source(rel_path, &source, deadline)
    }

    pub fn analyze_source(
        &self,
        rel_path: &str,
        source: &str,
        deadline: &Deadline,
    ) -> Result<(AnalysisResult, ExtractedFile), CoreError> {
        let mut extractor = Extractor::new()?;
        let extracted = extractor.extract(rel_path, source);
        deadline.check_hard(rel_path)?;

        let mut findings = Vec::new();
        let mut degraded = Vec::new();
        for site in &extracted.call_sites {
            deadline.check_hard(rel_path)?;
            // Past the soft limit the pipeline finalizes with rule results
            // only.
            let output = self.registry.detect(site, deadline.soft_exceeded());
            findings.extend(output.findings);
            degraded.extend(output.degraded);
        }

        let result =
            aggregate::build_result(rel_path, extracted.call_sites.len(), findings, degraded);
        Ok((result, extracted))
    }
}
