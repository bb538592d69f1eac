//! Graph builder: turns one file's extracted facts into immutable node and
//! edge deltas, applied through the store's single write path.
//!
//! Node ids are stable, path-like strings: repeated analysis of an
//! unchanged file produces byte-identical ids, so re-import is idempotent.

use crate::error::CoreError;
use crate::extract::ExtractedFile;
use crate::graph::store::{EdgeDelta, GraphStore, NodeDelta};
use crate::model::{CallSite, EdgeKind, NodeKind};
use blake3::Hasher;
use serde_json::{json, Value};
use std::collections::HashMap;

const CONTAINS_WEIGHT: f64 = 1.0;
const DEPENDS_WEIGHT: f64 = 0.8;
const CALLS_WEIGHT: f64 = 0.7;
const IMPORTS_WEIGHT: f64 = 0.5;

/// Content-addressed id for a query call-site. Built from the file path,
/// the normalized query text and the enclosing symbol, NOT the line
/// number, so formatting-only moves keep the id stable.
pub fn query_node_id(rel_path: &str, site: &CallSite) -> String {
    let mut hasher = Hasher::new();
    hasher.update(rel_path.as_bytes());
    hasher.update(b"\x00");
    hasher.update(site.query.as_bytes());
    hasher.update(b"\x00");
    if let Some(class) = &site.class {
        hasher.update(class.as_bytes());
        hasher.update(b".");
    }
    if let Some(method) = &site.method {
        hasher.update(method.as_bytes());
    }
    let hash = hasher.finalize();
    format!("query_{}", &hash.to_hex()[..16])
}

pub fn symbol_node_id(rel_path: &str, qualname: &str) -> String {
    format!("{rel_path}::{qualname}")
}

/// Dotted module path to the file node id it names.
fn module_to_path(module: &str) -> String {
    format!("{}.py", module.replace('.', "/"))
}

pub struct GraphBuilder<'a> {
    store: &'a GraphStore,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(store: &'a GraphStore) -> Self {
        Self { store }
    }

    /// Build and apply the deltas for one file. Returns (nodes, edges)
    /// applied.
    pub fn apply(
        &self,
        rel_path: &str,
        language: &str,
        content_hash: &str,
        extracted: &ExtractedFile,
    ) -> Result<(usize, usize), CoreError> {
        let (nodes, edges) = deltas(rel_path, language, content_hash, extracted);
        self.store.upsert_nodes(&nodes)?;
        self.store.upsert_edges(&edges)?;
        Ok((nodes.len(), edges.len()))
    }
}

/// Pure delta construction, deterministic for a given input.
pub fn deltas(
    rel_path: &str,
    language: &str,
    content_hash: &str,
    extracted: &ExtractedFile,
) -> (Vec<NodeDelta>, Vec<EdgeDelta>) {
    let mut nodes = Vec::new();
    let mut edges = Vec::new();

    let file_label = rel_path.rsplit('/').next().unwrap_or(rel_path).to_string();
    nodes.push(NodeDelta {
        id: rel_path.to_string(),
        label: file_label,
        kind: NodeKind::File,
        properties: object(&[
            ("language", json!(language)),
            ("content_hash", json!(content_hash)),
            ("complexity", json!(extracted.symbols.len().max(1))),
        ]),
    });

    // Name → qualname map for in-file call resolution.
    let mut by_name: HashMap<&str, &str> = HashMap::new();
    for symbol in &extracted.symbols {
        by_name.insert(symbol.name.as_str(), symbol.qualname.as_str());
    }

    for symbol in &extracted.symbols {
        let id = symbol_node_id(rel_path, &symbol.qualname);
        let span = (symbol.end_line - symbol.line + 1).max(1);
        nodes.push(NodeDelta {
            id: id.clone(),
            label: symbol.name.clone(),
            kind: symbol.kind,
            properties: object(&[
                ("language", json!(language)),
                ("line", json!(symbol.line)),
                ("complexity", json!(span)),
            ]),
        });
        let container = match symbol.qualname.rsplit_once('.') {
            Some((class, _)) => symbol_node_id(rel_path, class),
            None => rel_path.to_string(),
        };
        edges.push(EdgeDelta {
            source: container,
            target: id,
            kind: EdgeKind::Contains,
            weight: Some(CONTAINS_WEIGHT),
            properties: serde_json::Map::new(),
        });
    }

    for site in &extracted.call_sites {
        let id = query_node_id(rel_path, site);
        nodes.push(NodeDelta {
            id: id.clone(),
            label: site.verb.as_str().to_string(),
            kind: NodeKind::Query,
            properties: object(&[
                ("file", json!(rel_path)),
                ("line", json!(site.line)),
                ("verb", json!(site.verb.as_str())),
                ("dynamic", json!(site.is_dynamic())),
            ]),
        });
        let container = enclosing_node_id(rel_path, site);
        edges.push(EdgeDelta {
            source: container,
            target: id,
            kind: EdgeKind::Contains,
            weight: Some(CONTAINS_WEIGHT),
            properties: serde_json::Map::new(),
        });
    }

    for relation in &extracted.relations {
        match relation.kind {
            EdgeKind::Imports | EdgeKind::DependsOn => {
                if !relation.target_is_module {
                    continue;
                }
                let weight = if relation.kind == EdgeKind::Imports {
                    IMPORTS_WEIGHT
                } else {
                    DEPENDS_WEIGHT
                };
                edges.push(EdgeDelta {
                    source: rel_path.to_string(),
                    target: module_to_path(&relation.target),
                    kind: relation.kind,
                    weight: Some(weight),
                    properties: serde_json::Map::new(),
                });
            }
            EdgeKind::Calls => {
                // Resolve the callee within the file; cross-file reach is
                // carried by the import-derived DEPENDS_ON edges.
                let callee_name = relation
                    .target
                    .rsplit('.')
                    .next()
                    .unwrap_or(relation.target.as_str());
                let Some(&qualname) = by_name.get(callee_name) else {
                    continue;
                };
                let source = match &relation.source_qualname {
                    Some(qual) => symbol_node_id(rel_path, qual),
                    None => rel_path.to_string(),
                };
                let target = symbol_node_id(rel_path, qualname);
                if source == target {
                    continue;
                }
                edges.push(EdgeDelta {
                    source,
                    target,
                    kind: EdgeKind::Calls,
                    weight: Some(CALLS_WEIGHT),
                    properties: serde_json::Map::new(),
                });
            }
            EdgeKind::Contains => {}
        }
    }

    (nodes, edges)
}

/// The node a call-site hangs off: its method, else its class, else the
/// file itself.
pub fn enclosing_node_id(rel_path: &str, site: &CallSite) -> String {
    match (&site.class, &site.method) {
        (Some(class), Some(method)) => symbol_node_id(rel_path, &format!("{class}.{method}")),
        (None, Some(method)) => symbol_node_id(rel_path, method),
        (Some(class), None) => symbol_node_id(rel_path, class),
        (None, None) => rel_path.to_string(),
    }
}

fn object(pairs: &[(&str, Value)]) -> serde_json::Map<String, Value> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}
