//! Impact analysis engine.
//!
//! Answers "what breaks if I change this?" with a bounded breadth-first
//! traversal over incoming DEPENDS_ON/CALLS edges, risk-scoring each
//! visited node by distance decay, shortest-path edge weight and intrinsic
//! complexity.

use crate::config::{Config, RiskAggregation};
use crate::error::CoreError;
use crate::graph::store::GraphStore;
use crate::model::{
    AffectedFile, EdgeKind, GraphNode, ImpactResult, ImpactSummary, NodeKind, RiskLevel, Subgraph,
};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};

/// Hard ceiling on traversal depth; requests beyond it are rejected, not
/// clamped, so callers can detect misconfiguration.
pub const MAX_TRAVERSAL_DEPTH: usize = 10;

pub const DEFAULT_DEPTH: usize = 3;

/// Per-hop decay of risk contribution beyond the first.
const RISK_DECAY: f64 = 0.7;

/// Per-level decay of result confidence.
const CONFIDENCE_DECAY: f32 = 0.9;

/// Confidence penalty scale for edges lacking a weight property.
const UNWEIGHTED_PENALTY: f32 = 0.25;

/// Assumed weight for edges without one, and assumed normalized complexity
/// for nodes without one.
const DEFAULT_EDGE_WEIGHT: f64 = 0.5;
const DEFAULT_COMPLEXITY_NORM: f64 = 0.5;

const TRAVERSAL_KINDS: [EdgeKind; 2] = [EdgeKind::DependsOn, EdgeKind::Calls];

struct Visit {
    distance: usize,
    dependency_kind: EdgeKind,
    path_weight: f64,
}

pub struct ImpactEngine<'a> {
    store: &'a GraphStore,
    aggregation: RiskAggregation,
}

impl<'a> ImpactEngine<'a> {
    pub fn new(store: &'a GraphStore) -> Self {
        Self {
            store,
            aggregation: Config::get().risk_aggregation,
        }
    }

    pub fn with_aggregation(store: &'a GraphStore, aggregation: RiskAggregation) -> Self {
        Self { store, aggregation }
    }

    /// Compute the transitive-affected set of `target` up to `depth` hops.
    ///
    /// `include_indirect = false` limits the result to direct (distance 1)
    /// dependents. An absent target is `NotFound`; a depth beyond
    /// [`MAX_TRAVERSAL_DEPTH`] is `TraversalBoundExceeded`.
    pub fn analyze(
        &self,
        target: &str,
        depth: usize,
        include_indirect: bool,
    ) -> Result<ImpactResult, CoreError> {
        if depth > MAX_TRAVERSAL_DEPTH {
            return Err(CoreError::TraversalBoundExceeded {
                requested: depth,
                max: MAX_TRAVERSAL_DEPTH,
            });
        }
        let target_node = self
            .store
            .node(target)?
            .ok_or_else(|| CoreError::NotFound(target.to_string()))?;

        let effective_depth = if include_indirect { depth } else { depth.min(1) };

        // BFS, level by level. First-seen distance wins: BFS guarantees the
        // shortest distance is recorded once per node.
        let mut visits: HashMap<String, Visit> = HashMap::new();
        visits.insert(
            target.to_string(),
            Visit {
                distance: 0,
                dependency_kind: EdgeKind::DependsOn,
                path_weight: 1.0,
            },
        );
        let mut frontier = vec![target.to_string()];
        let mut unweighted_edges = 0usize;
        let mut traversed_edges = 0usize;
        let mut max_distance = 0usize;

        for distance in 0..effective_depth {
            if frontier.is_empty() {
                break;
            }
            let edges = self.store.incoming_edges(&frontier, &TRAVERSAL_KINDS)?;
            let mut next = Vec::new();
            for edge in edges {
                if visits.contains_key(&edge.source) {
                    continue;
                }
                let parent_weight = visits
                    .get(&edge.target)
                    .map(|visit| visit.path_weight)
                    .unwrap_or(1.0);
                traversed_edges += 1;
                if edge.weight.is_none() {
                    unweighted_edges += 1;
                }
                let weight = edge.weight.unwrap_or(DEFAULT_EDGE_WEIGHT);
                visits.insert(
                    edge.source.clone(),
                    Visit {
                        distance: distance + 1,
                        dependency_kind: edge.kind,
                        path_weight: (parent_weight * weight).clamp(0.0, 1.0),
                    },
                );
                max_distance = max_distance.max(distance + 1);
                next.push(edge.source);
            }
            frontier = next;
        }

        let mut visited_ids: Vec<String> = visits.keys().cloned().collect();
        visited_ids.sort();
        let nodes = self.store.nodes_by_ids(&visited_ids)?;

        // Group visited nodes into affected entries: files and classes are
        // entries, methods attach to their container.
        let mut entries: BTreeMap<String, AffectedFile> = BTreeMap::new();
        let mut method_count = 0usize;
        let mut class_count = 0usize;
        let mut file_count = 0usize;
        let mut risks: Vec<f64> = Vec::new();

        for node in &nodes {
            if node.id == target {
                continue;
            }
            let Some(visit) = visits.get(&node.id) else {
                continue;
            };
            let risk = risk_contribution(visit, node);
            risks.push(risk);
            match node.kind {
                NodeKind::Method => {
                    method_count += 1;
                    let container = method_container(&node.id);
                    if let Some(entry) = entries.get_mut(&container) {
                        entry.methods.push(node.label.clone());
                        entry.risk_contribution = entry.risk_contribution.max(risk);
                        continue;
                    }
                    entries.insert(node.id.clone(), entry_for(node, visit, risk));
                }
                NodeKind::Query => {}
                NodeKind::Class => {
                    class_count += 1;
                    entries.insert(node.id.clone(), entry_for(node, visit, risk));
                }
                NodeKind::File => {
                    file_count += 1;
                    entries.insert(node.id.clone(), entry_for(node, visit, risk));
                }
            }
        }

        let mut affected: Vec<AffectedFile> = entries.into_values().collect();
        affected.sort_by(|a, b| {
            a.distance.cmp(&b.distance).then_with(|| {
                b.risk_contribution
                    .partial_cmp(&a.risk_contribution)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.path.cmp(&b.path))
            })
        });

        let risk_level = classify_risk(&risks, self.aggregation);
        let confidence = traversal_confidence(max_distance, unweighted_edges, traversed_edges);

        let summary = ImpactSummary {
            total_affected_files: file_count,
            total_affected_methods: method_count,
            total_affected_classes: class_count,
            risk_level,
            confidence,
        };

        // Induced subgraph for visualization; the target copy is flagged.
        let mut subgraph_nodes = Vec::with_capacity(nodes.len());
        for node in &nodes {
            let mut node = node.clone();
            if node.id == target {
                node.properties
                    .insert("is_target".to_string(), json!(true));
            }
            subgraph_nodes.push(node);
        }
        let subgraph_edges = self.store.edges_among(&visited_ids, &TRAVERSAL_KINDS)?;

        let mut target_node = target_node;
        target_node
            .properties
            .insert("is_target".to_string(), json!(true));

        Ok(ImpactResult {
            target: target_node,
            summary,
            affected,
            subgraph: Subgraph {
                nodes: subgraph_nodes,
                edges: subgraph_edges,
            },
        })
    }
}

fn entry_for(node: &GraphNode, visit: &Visit, risk: f64) -> AffectedFile {
    AffectedFile {
        path: node.id.clone(),
        name: node.label.clone(),
        distance: visit.distance,
        dependency_kind: visit.dependency_kind,
        methods: if node.kind == NodeKind::Method {
            vec![node.label.clone()]
        } else {
            Vec::new()
        },
        risk_contribution: risk,
    }
}

/// Container id of a method node: `file::Class.m` belongs to
/// `file::Class`, a top-level `file::fn` belongs to `file`.
fn method_container(id: &str) -> String {
    match id.rsplit_once("::") {
        Some((file, qualname)) => match qualname.rsplit_once('.') {
            Some((class, _)) => format!("{file}::{class}"),
            None => file.to_string(),
        },
        None => id.to_string(),
    }
}

/// Risk decreases with distance, scaled by the shortest-path edge weight
/// and the node's intrinsic complexity, normalized to [0, 1].
fn risk_contribution(visit: &Visit, node: &GraphNode) -> f64 {
    let decay = RISK_DECAY.powi(visit.distance.saturating_sub(1) as i32);
    let complexity = node
        .properties
        .get("complexity")
        .and_then(|value| value.as_f64())
        .map(|c| (c / 20.0).clamp(0.1, 1.0))
        .unwrap_or(DEFAULT_COMPLEXITY_NORM);
    (decay * visit.path_weight * complexity).clamp(0.0, 1.0)
}

fn classify_risk(risks: &[f64], aggregation: RiskAggregation) -> RiskLevel {
    if risks.is_empty() {
        return RiskLevel::Low;
    }
    let aggregate = match aggregation {
        RiskAggregation::Mean => risks.iter().sum::<f64>() / risks.len() as f64,
        RiskAggregation::Max => risks.iter().cloned().fold(0.0, f64::max),
    };
    if aggregate < 0.33 {
        RiskLevel::Low
    } else if aggregate < 0.66 {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    }
}

/// Confidence decreases with traversal depth and with the fraction of
/// edges lacking a weight property.
fn traversal_confidence(max_distance: usize, unweighted: usize, traversed: usize) -> f32 {
    let base = 0.95 * CONFIDENCE_DECAY.powi(max_distance as i32);
    let unweighted_frac = if traversed == 0 {
        0.0
    } else {
        unweighted as f32 / traversed as f32
    };
    (base * (1.0 - UNWEIGHTED_PENALTY * unweighted_frac)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_decays_with_distance() {
        let node = GraphNode {
            id: "a".to_string(),
            label: "a".to_string(),
            kind: NodeKind::File,
            properties: serde_json::Map::new(),
        };
        let near = Visit {
            distance: 1,
            dependency_kind: EdgeKind::DependsOn,
            path_weight: 1.0,
        };
        let far = Visit {
            distance: 3,
            dependency_kind: EdgeKind::DependsOn,
            path_weight: 1.0,
        };
        assert!(risk_contribution(&near, &node) > risk_contribution(&far, &node));
    }

    #[test]
    fn risk_classification_thresholds() {
        assert_eq!(classify_risk(&[], RiskAggregation::Mean), RiskLevel::Low);
        assert_eq!(classify_risk(&[0.1, 0.2], RiskAggregation::Mean), RiskLevel::Low);
        assert_eq!(classify_risk(&[0.5, 0.5], RiskAggregation::Mean), RiskLevel::Medium);
        assert_eq!(classify_risk(&[0.9, 0.8], RiskAggregation::Mean), RiskLevel::High);
        // Max aggregation flips a mostly-quiet set with one hot node.
        assert_eq!(classify_risk(&[0.1, 0.7], RiskAggregation::Mean), RiskLevel::Medium);
        assert_eq!(classify_risk(&[0.1, 0.7], RiskAggregation::Max), RiskLevel::High);
    }

    #[test]
    fn confidence_drops_with_depth_and_unknown_weights() {
        let shallow = traversal_confidence(1, 0, 4);
        let deep = traversal_confidence(4, 0, 4);
        assert!(shallow > deep);

        let weighted = traversal_confidence(2, 0, 10);
        let unweighted = traversal_confidence(2, 10, 10);
        assert!(weighted > unweighted);
    }

    #[test]
    fn method_container_resolution() {
        assert_eq!(
            method_container("app/repo.py::UserRepository.find"),
            "app/repo.py::UserRepository"
        );
        assert_eq!(method_container("app/repo.py::helper"), "app/repo.py");
        assert_eq!(method_container("User"), "User");
    }
}
