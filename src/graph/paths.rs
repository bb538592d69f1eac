//! Bounded path enumeration between two nodes.
//!
//! BFS finds the shortest path first (ties broken by edge insertion order,
//! so results are deterministic); when one exists, a bounded depth-first
//! enumeration collects every simple path up to the depth limit.

use crate::error::CoreError;
use crate::graph::store::GraphStore;
use crate::model::PathResult;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

pub const DEFAULT_MAX_DEPTH: usize = 6;

pub fn find_paths(
    store: &GraphStore,
    source: &str,
    target: &str,
    max_depth: usize,
) -> Result<PathResult, CoreError> {
    store
        .node(source)?
        .ok_or_else(|| CoreError::NotFound(source.to_string()))?;
    store
        .node(target)?
        .ok_or_else(|| CoreError::NotFound(target.to_string()))?;

    if source == target {
        return Ok(PathResult {
            paths: vec![vec![source.to_string()]],
            shortest_length: Some(0),
        });
    }
    if max_depth == 0 {
        return Ok(PathResult {
            paths: Vec::new(),
            shortest_length: None,
        });
    }

    let adjacency = build_adjacency(store)?;

    // No path within the bound is an explicit empty result, not an error.
    if shortest_path(&adjacency, source, target, max_depth).is_none() {
        return Ok(PathResult {
            paths: Vec::new(),
            shortest_length: None,
        });
    }

    let mut paths = Vec::new();
    let mut current = vec![source.to_string()];
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(source.to_string());
    enumerate(
        &adjacency,
        source,
        target,
        max_depth,
        &mut current,
        &mut visited,
        &mut paths,
    );

    paths.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    let shortest_length = paths.first().map(|path| path.len() - 1);

    Ok(PathResult {
        paths,
        shortest_length,
    })
}

/// Outgoing adjacency over every edge kind, neighbors in edge insertion
/// order, deduplicated (parallel edges walk the same node pair once).
fn build_adjacency(store: &GraphStore) -> Result<BTreeMap<String, Vec<String>>, CoreError> {
    let mut adjacency: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for edge in store.all_edges()? {
        let neighbors = adjacency.entry(edge.source).or_default();
        if !neighbors.contains(&edge.target) {
            neighbors.push(edge.target);
        }
    }
    Ok(adjacency)
}

fn shortest_path(
    adjacency: &BTreeMap<String, Vec<String>>,
    source: &str,
    target: &str,
    max_depth: usize,
) -> Option<usize> {
    let mut queue: VecDeque<(String, usize)> = VecDeque::new();
    let mut seen: HashMap<String, usize> = HashMap::new();
    queue.push_back((source.to_string(), 0));
    seen.insert(source.to_string(), 0);
    while let Some((node, distance)) = queue.pop_front() {
        if node == target {
            return Some(distance);
        }
        if distance == max_depth {
            continue;
        }
        if let Some(neighbors) = adjacency.get(&node) {
            for neighbor in neighbors {
                if !seen.contains_key(neighbor) {
                    seen.insert(neighbor.clone(), distance + 1);
                    queue.push_back((neighbor.clone(), distance + 1));
                }
            }
        }
    }
    None
}

/// Bounded enumeration of simple paths: no repeated nodes within a path.
fn enumerate(
    adjacency: &BTreeMap<String, Vec<String>>,
    node: &str,
    target: &str,
    max_depth: usize,
    current: &mut Vec<String>,
    visited: &mut HashSet<String>,
    paths: &mut Vec<Vec<String>>,
) {
    if current.len() > max_depth {
        return;
    }
    if let Some(neighbors) = adjacency.get(node) {
        for neighbor in neighbors {
            if neighbor == target {
                let mut path = current.clone();
                path.push(target.to_string());
                paths.push(path);
                continue;
            }
            if visited.contains(neighbor) {
                continue;
            }
            visited.insert(neighbor.clone());
            current.push(neighbor.clone());
            enumerate(adjacency, neighbor, target, max_depth, current, visited, paths);
            current.pop();
            visited.remove(neighbor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::store::{EdgeDelta, NodeDelta};
    use crate::model::{EdgeKind, NodeKind};

    fn temp_store() -> (tempfile::TempDir, GraphStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = GraphStore::new(&dir.path().join("graph.sqlite")).unwrap();
        (dir, store)
    }

    fn seed(store: &GraphStore, ids: &[&str], edges: &[(&str, &str)]) {
        let nodes: Vec<NodeDelta> = ids
            .iter()
            .map(|id| NodeDelta {
                id: id.to_string(),
                label: id.to_string(),
                kind: NodeKind::File,
                properties: serde_json::Map::new(),
            })
            .collect();
        store.upsert_nodes(&nodes).unwrap();
        let deltas: Vec<EdgeDelta> = edges
            .iter()
            .map(|(source, target)| EdgeDelta {
                source: source.to_string(),
                target: target.to_string(),
                kind: EdgeKind::DependsOn,
                weight: Some(0.8),
                properties: serde_json::Map::new(),
            })
            .collect();
        store.upsert_edges(&deltas).unwrap();
    }

    #[test]
    fn shortest_and_alternates_sorted_by_length() {
        let (_dir, store) = temp_store();
        seed(
            &store,
            &["a", "b", "c", "d"],
            &[("a", "d"), ("a", "b"), ("b", "d"), ("b", "c"), ("c", "d")],
        );
        let result = find_paths(&store, "a", "d", 5).unwrap();
        assert_eq!(result.shortest_length, Some(1));
        assert_eq!(result.paths.len(), 3);
        assert_eq!(result.paths[0], vec!["a", "d"]);
        assert_eq!(result.paths[1], vec!["a", "b", "d"]);
        assert_eq!(result.paths[2], vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn self_path_is_zero_length() {
        let (_dir, store) = temp_store();
        seed(&store, &["a"], &[]);
        let result = find_paths(&store, "a", "a", 3).unwrap();
        assert_eq!(result.shortest_length, Some(0));
        assert_eq!(result.paths, vec![vec!["a".to_string()]]);
    }

    #[test]
    fn disconnected_nodes_yield_empty_result() {
        let (_dir, store) = temp_store();
        seed(&store, &["a", "b"], &[]);
        let result = find_paths(&store, "a", "b", 5).unwrap();
        assert!(result.paths.is_empty());
        assert_eq!(result.shortest_length, None);
    }

    #[test]
    fn missing_endpoint_is_not_found() {
        let (_dir, store) = temp_store();
        seed(&store, &["a"], &[]);
        let err = find_paths(&store, "a", "ghost", 5).unwrap_err();
        assert!(matches!(err, crate::error::CoreError::NotFound(_)));
    }

    #[test]
    fn depth_bound_hides_long_paths() {
        let (_dir, store) = temp_store();
        seed(
            &store,
            &["a", "b", "c", "d"],
            &[("a", "b"), ("b", "c"), ("c", "d")],
        );
        let bounded = find_paths(&store, "a", "d", 2).unwrap();
        assert!(bounded.paths.is_empty());
        let unbounded = find_paths(&store, "a", "d", 3).unwrap();
        assert_eq!(unbounded.shortest_length, Some(3));
    }

    #[test]
    fn cycle_does_not_loop_enumeration() {
        let (_dir, store) = temp_store();
        seed(
            &store,
            &["a", "b", "c"],
            &[("a", "b"), ("b", "a"), ("b", "c")],
        );
        let result = find_paths(&store, "a", "c", 4).unwrap();
        assert_eq!(result.paths, vec![vec!["a", "b", "c"]]);
    }
}
