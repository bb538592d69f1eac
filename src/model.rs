use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Query verb inferred from the leading keyword of a call-site's query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryVerb {
    Select,
    Insert,
    Update,
    Delete,
    Batch,
    Unknown,
}

impl QueryVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryVerb::Select => "SELECT",
            QueryVerb::Insert => "INSERT",
            QueryVerb::Update => "UPDATE",
            QueryVerb::Delete => "DELETE",
            QueryVerb::Batch => "BATCH",
            QueryVerb::Unknown => "UNKNOWN",
        }
    }
}

/// Severity shared across all detectors so findings rank comparably.
/// Variant order matters: `Ord` sorts Low < Medium < High < Critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueKind {
    FullScanFilter,
    MissingPartitionKey,
    OversizedBatch,
    UnpreparedStatement,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::FullScanFilter => "full-scan-filter",
            IssueKind::MissingPartitionKey => "missing-partition-key",
            IssueKind::OversizedBatch => "oversized-batch",
            IssueKind::UnpreparedStatement => "unprepared-statement",
        }
    }
}

/// One location in source code where a query is issued.
///
/// Immutable once extracted; the same value feeds the detector registry and
/// the graph builder, so detection and graph building cannot diverge.
#[derive(Debug, Clone, Serialize)]
pub struct CallSite {
    pub file_path: String,
    /// 1-based line of the first physical line of the query.
    pub line: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    /// Reconstructed literal form of the query text.
    pub query: String,
    pub verb: QueryVerb,
    /// Free-form context; `dynamic_construction = "true"` marks queries
    /// assembled by concatenation or formatting.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
}

impl CallSite {
    pub fn is_dynamic(&self) -> bool {
        self.context
            .get("dynamic_construction")
            .map(|v| v == "true")
            .unwrap_or(false)
    }
}

/// One classification emitted by a detector. Never mutated after creation;
/// the aggregator resolves duplicates by building new values.
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub detector: String,
    pub kind: IssueKind,
    pub severity: Severity,
    pub confidence: f32,
    pub message: String,
    pub recommendation: String,
    pub evidence: Vec<String>,
    pub site: CallSite,
}

/// Per-file analysis output.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub file_path: String,
    pub call_sites: usize,
    pub findings: Vec<Finding>,
    pub severity_counts: BTreeMap<String, usize>,
    /// Semantic detectors that lost their signal for this file. The
    /// rule-based findings above still stand.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub degraded_detectors: Vec<String>,
}

/// A file that failed analysis, reported distinctly from files that simply
/// produced zero findings.
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub path: String,
    pub error: String,
}

/// Merged output of one batch run.
#[derive(Debug, Serialize)]
pub struct RunResult {
    pub per_file: Vec<AnalysisResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FileFailure>,
    pub successful: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeKind {
    File,
    Class,
    Method,
    Query,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::File => "FILE",
            NodeKind::Class => "CLASS",
            NodeKind::Method => "METHOD",
            NodeKind::Query => "QUERY",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "FILE" => Some(NodeKind::File),
            "CLASS" => Some(NodeKind::Class),
            "METHOD" => Some(NodeKind::Method),
            "QUERY" => Some(NodeKind::Query),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    Contains,
    Imports,
    DependsOn,
    Calls,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Contains => "CONTAINS",
            EdgeKind::Imports => "IMPORTS",
            EdgeKind::DependsOn => "DEPENDS_ON",
            EdgeKind::Calls => "CALLS",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CONTAINS" => Some(EdgeKind::Contains),
            "IMPORTS" => Some(EdgeKind::Imports),
            "DEPENDS_ON" => Some(EdgeKind::DependsOn),
            "CALLS" => Some(EdgeKind::Calls),
            _ => None,
        }
    }
}

/// A node read back from the graph store.
#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub kind: NodeKind,
    pub properties: serde_json::Map<String, Value>,
}

/// A directed edge read back from the graph store. Multiple kinds between
/// the same pair are distinct edges.
#[derive(Debug, Clone, Serialize)]
pub struct GraphEdge {
    pub id: i64,
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    pub properties: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Computed per impact query, not persisted.
#[derive(Debug, Serialize)]
pub struct ImpactSummary {
    pub total_affected_files: usize,
    pub total_affected_methods: usize,
    pub total_affected_classes: usize,
    pub risk_level: RiskLevel,
    pub confidence: f32,
}

/// One member of the affected set.
#[derive(Debug, Clone, Serialize)]
pub struct AffectedFile {
    pub path: String,
    pub name: String,
    /// Minimum graph distance from the target.
    pub distance: usize,
    /// Kind of the edge that introduced this node into the affected set.
    pub dependency_kind: EdgeKind,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
    pub risk_contribution: f64,
}

/// Induced subgraph of an impact query, for visualization.
#[derive(Debug, Serialize)]
pub struct Subgraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Serialize)]
pub struct ImpactResult {
    pub target: GraphNode,
    pub summary: ImpactSummary,
    pub affected: Vec<AffectedFile>,
    pub subgraph: Subgraph,
}

/// An elementary cycle in the DEPENDS_ON/IMPORTS subgraph, canonicalized to
/// start at its lexicographically smallest node id.
#[derive(Debug, Clone, Serialize)]
pub struct Cycle {
    pub nodes: Vec<String>,
    pub length: usize,
    /// Derived from cycle length and edge weights, in [0, 1].
    pub severity: f64,
}

#[derive(Debug, Serialize)]
pub struct PathResult {
    /// Simple paths from source to target, sorted by length ascending.
    pub paths: Vec<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shortest_length: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct GraphOverview {
    pub nodes: i64,
    pub edges: i64,
    pub nodes_by_kind: BTreeMap<String, i64>,
    pub edges_by_kind: BTreeMap<String, i64>,
}
