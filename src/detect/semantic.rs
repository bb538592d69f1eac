//! Semantic detector backed by an external reasoning service.
//!
//! Rule detectors handle the unambiguous cases; a site where the rule
//! signal is ambiguous (a batch whose size cannot be counted statically, a
//! dynamically built SELECT whose filtering behavior is unclear) is
//! delegated to the reasoning boundary. Classifications are cached by a
//! content fingerprint, so repeated sites cost one call.

use crate::config::Config;
use crate::detect::severity::severity_for;
use crate::detect::{Detection, Detector};
use crate::extract::query;
use crate::model::{CallSite, Finding, IssueKind, QueryVerb};
use anyhow::Result;
use blake3::Hasher;
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Request crossing the reasoning boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningRequest {
    pub query_text: String,
    pub surrounding_code: String,
    pub file_context: String,
    pub analysis_type: String,
}

/// Response from the reasoning boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningResponse {
    pub is_issue: bool,
    pub confidence: f32,
    pub reasoning: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    #[serde(default)]
    pub evidence: Vec<String>,
}

/// Transport seam for the external reasoning service. Timeout and retries
/// are configuration on this side of the boundary, not protocol.
pub trait ReasoningService: Send + Sync {
    fn classify(&self, request: &ReasoningRequest) -> Result<ReasoningResponse>;
}

/// Typed outcome of one semantic classification. Degradation never crosses
/// the detector boundary as an error.
#[derive(Debug)]
pub enum SemanticOutcome {
    Classified(ReasoningResponse),
    Degraded,
}

/// Shared classification cache keyed by content fingerprint. Concurrent
/// reads and writes are safe; a duplicate concurrent miss recomputing the
/// same key is tolerated since classifications are idempotent.
pub struct SemanticCache {
    cache: Cache<String, ReasoningResponse>,
}

impl SemanticCache {
    pub fn new(max_entries: u64) -> Self {
        let cache = Cache::builder().max_capacity(max_entries).build();
        Self { cache }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(Config::get().semantic_cache_capacity)
    }

    pub fn get(&self, fingerprint: &str) -> Option<ReasoningResponse> {
        self.cache.get(fingerprint)
    }

    pub fn insert(&self, fingerprint: String, response: ReasoningResponse) {
        self.cache.insert(fingerprint, response);
    }

    pub fn len(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Content fingerprint of (query text, surrounding code, analysis type).
/// Line numbers and file paths stay out, so moved-but-unchanged sites hit.
pub fn fingerprint(request: &ReasoningRequest) -> String {
    let mut hasher = Hasher::new();
    hasher.update(request.query_text.as_bytes());
    hasher.update(b"\x00");
    hasher.update(request.surrounding_code.as_bytes());
    hasher.update(b"\x00");
    hasher.update(request.analysis_type.as_bytes());
    let hash = hasher.finalize();
    format!("sem_{}", &hash.to_hex()[..32])
}

pub struct SemanticDetector {
    cache: Arc<SemanticCache>,
    service: Arc<dyn ReasoningService>,
    timeout: Duration,
    retries: u32,
    backoff: Duration,
}

impl SemanticDetector {
    pub fn new(cache: Arc<SemanticCache>, service: Arc<dyn ReasoningService>) -> Self {
        let config = Config::get();
        Self {
            cache,
            service,
            timeout: Duration::from_millis(config.semantic_timeout_ms),
            retries: config.semantic_retries,
            backoff: Duration::from_millis(config.semantic_backoff_ms),
        }
    }

    pub fn with_limits(
        cache: Arc<SemanticCache>,
        service: Arc<dyn ReasoningService>,
        timeout: Duration,
        retries: u32,
        backoff: Duration,
    ) -> Self {
        Self {
            cache,
            service,
            timeout,
            retries,
            backoff,
        }
    }

    /// Whether the rule-based signal for this site is ambiguous enough to
    /// warrant a reasoning call.
    fn analysis_type(site: &CallSite) -> Option<&'static str> {
        if site.verb == QueryVerb::Batch
            && query::batch_statement_count(&site.query, site.is_dynamic()).is_none()
        {
            return Some("batch_size");
        }
        if site.verb == QueryVerb::Select
            && site.is_dynamic()
            && !query::has_allow_filtering(&site.query)
        {
            return Some("filtering_behavior");
        }
        None
    }

    fn issue_kind(analysis_type: &str) -> IssueKind {
        match analysis_type {
            "batch_size" => IssueKind::OversizedBatch,
            _ => IssueKind::FullScanFilter,
        }
    }

    /// Resolve a classification through the cache, calling out on a miss.
    pub fn classify(&self, request: &ReasoningRequest) -> SemanticOutcome {
        let key = fingerprint(request);
        if let Some(cached) = self.cache.get(&key) {
            return SemanticOutcome::Classified(cached);
        }
        match self.call_with_retry(request) {
            Some(response) => {
                self.cache.insert(key, response.clone());
                SemanticOutcome::Classified(response)
            }
            None => SemanticOutcome::Degraded,
        }
    }

    /// One bounded-timeout call per attempt, fixed backoff between
    /// attempts. A call still in flight when its timeout fires is
    /// abandoned, not awaited.
    fn call_with_retry(&self, request: &ReasoningRequest) -> Option<ReasoningResponse> {
        for attempt in 0..=self.retries {
            if attempt > 0 {
                thread::sleep(self.backoff);
            }
            let (tx, rx) = mpsc::channel();
            let service = Arc::clone(&self.service);
            let request = request.clone();
            thread::spawn(move || {
                let _ = tx.send(service.classify(&request));
            });
            match rx.recv_timeout(self.timeout) {
                Ok(Ok(response)) => return Some(response),
                Ok(Err(err)) => {
                    eprintln!("cqlint: reasoning call failed (attempt {attempt}): {err}");
                }
                Err(_) => {
                    eprintln!("cqlint: reasoning call timed out (attempt {attempt})");
                }
            }
        }
        None
    }
}

impl Detector for SemanticDetector {
    fn name(&self) -> &'static str {
        "semantic"
    }

    fn is_expensive(&self) -> bool {
        true
    }

    fn detect(&self, site: &CallSite) -> Detection {
        let Some(analysis_type) = Self::analysis_type(site) else {
            return Detection::none();
        };
        let request = ReasoningRequest {
            query_text: site.query.clone(),
            surrounding_code: site
                .context
                .get("snippet")
                .cloned()
                .unwrap_or_else(|| site.query.clone()),
            file_context: site.file_path.clone(),
            analysis_type: analysis_type.to_string(),
        };
        match self.classify(&request) {
            SemanticOutcome::Classified(response) => {
                if !response.is_issue || response.confidence < 0.5 {
                    return Detection::none();
                }
                let kind = Self::issue_kind(analysis_type);
                Detection::of(Finding {
                    detector: self.name().to_string(),
                    kind,
                    severity: severity_for(kind),
                    confidence: response.confidence.clamp(0.0, 1.0),
                    message: response.reasoning,
                    recommendation: response
                        .recommendation
                        .unwrap_or_else(|| "Review this query's access pattern".to_string()),
                    evidence: response.evidence,
                    site: site.clone(),
                })
            }
            SemanticOutcome::Degraded => Detection::degraded(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedService {
        response: ReasoningResponse,
        calls: AtomicUsize,
    }

    impl FixedService {
        fn new(is_issue: bool, confidence: f32) -> Self {
            Self {
                response: ReasoningResponse {
                    is_issue,
                    confidence,
                    reasoning: "batch grows with the input collection".to_string(),
                    recommendation: Some("chunk the writes".to_string()),
                    evidence: vec!["loop appends one statement per element".to_string()],
                },
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl ReasoningService for FixedService {
        fn classify(&self, _request: &ReasoningRequest) -> Result<ReasoningResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }
    }

    struct FailingService;

    impl ReasoningService for FailingService {
        fn classify(&self, _request: &ReasoningRequest) -> Result<ReasoningResponse> {
            anyhow::bail!("backend unavailable")
        }
    }

    struct HangingService;

    impl ReasoningService for HangingService {
        fn classify(&self, _request: &ReasoningRequest) -> Result<ReasoningResponse> {
            thread::sleep(Duration::from_secs(30));
            anyhow::bail!("unreachable")
        }
    }

    fn ambiguous_batch_site() -> CallSite {
        let mut context = BTreeMap::new();
        context.insert("dynamic_construction".to_string(), "true".to_string());
        CallSite {
            file_path: "app/batch.py".to_string(),
            line: 4,
            method: Some("flush".to_string()),
            class: None,
            query: "BEGIN BATCH INSERT INTO t (id) VALUES (?); APPLY BATCH".to_string(),
            verb: QueryVerb::Batch,
            context,
        }
    }

    fn detector(service: Arc<dyn ReasoningService>) -> SemanticDetector {
        SemanticDetector::with_limits(
            Arc::new(SemanticCache::new(64)),
            service,
            Duration::from_millis(50),
            1,
            Duration::from_millis(1),
        )
    }

    #[test]
    fn fingerprint_ignores_location() {
        let a = ReasoningRequest {
            query_text: "SELECT * FROM t".to_string(),
            surrounding_code: "ctx".to_string(),
            file_context: "a.py".to_string(),
            analysis_type: "filtering_behavior".to_string(),
        };
        let mut b = a.clone();
        b.file_context = "elsewhere/b.py".to_string();
        assert_eq!(fingerprint(&a), fingerprint(&b));

        let mut c = a.clone();
        c.analysis_type = "batch_size".to_string();
        assert_ne!(fingerprint(&a), fingerprint(&c));
    }

    #[test]
    fn hit_skips_the_service() {
        let service = Arc::new(FixedService::new(true, 0.8));
        let cache = Arc::new(SemanticCache::new(64));
        let detector = SemanticDetector::with_limits(
            Arc::clone(&cache),
            Arc::clone(&service) as Arc<dyn ReasoningService>,
            Duration::from_millis(200),
            1,
            Duration::from_millis(1),
        );
        let site = ambiguous_batch_site();
        let first = detector.detect(&site);
        assert_eq!(first.findings.len(), 1);
        assert_eq!(first.findings[0].kind, IssueKind::OversizedBatch);
        let second = detector.detect(&site);
        assert_eq!(second.findings.len(), 1);
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failure_degrades_instead_of_erroring() {
        let detector = detector(Arc::new(FailingService));
        let result = detector.detect(&ambiguous_batch_site());
        assert!(result.findings.is_empty());
        assert!(result.degraded);
    }

    #[test]
    fn timeout_abandons_the_call() {
        let detector = detector(Arc::new(HangingService));
        let start = std::time::Instant::now();
        let result = detector.detect(&ambiguous_batch_site());
        assert!(result.degraded);
        // Two attempts at 50ms plus one 1ms backoff, far below the 30s hang.
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn unambiguous_sites_are_not_delegated() {
        let service = Arc::new(FixedService::new(true, 0.9));
        let detector = SemanticDetector::with_limits(
            Arc::new(SemanticCache::new(64)),
            Arc::clone(&service) as Arc<dyn ReasoningService>,
            Duration::from_millis(200),
            0,
            Duration::from_millis(1),
        );
        let mut site = ambiguous_batch_site();
        site.verb = QueryVerb::Select;
        site.query = "SELECT * FROM t WHERE id = ?".to_string();
        site.context.clear();
        let result = detector.detect(&site);
        assert!(result.findings.is_empty());
        assert!(!result.degraded);
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn low_confidence_classification_is_dropped() {
        let detector = detector(Arc::new(FixedService::new(true, 0.3)));
        let result = detector.detect(&ambiguous_batch_site());
        assert!(result.findings.is_empty());
        assert!(!result.degraded);
    }
}
