//! Elementary cycle detection over the DEPENDS_ON/IMPORTS subgraph.
//!
//! Depth-first search with an active-path stack and per-node
//! unvisited/on-stack/done coloring: a back-edge to an on-stack node closes
//! a cycle. Cycles are canonicalized by rotating to their lexicographically
//! smallest node id, which deduplicates equivalent rotations. Each edge
//! instance is followed at most once per branch, so self-loops and parallel
//! edges terminate.

use crate::error::CoreError;
use crate::graph::store::GraphStore;
use crate::model::{Cycle, EdgeKind};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

const CYCLE_KINDS: [EdgeKind; 2] = [EdgeKind::DependsOn, EdgeKind::Imports];

/// Length at which severity stops growing.
const LENGTH_CAP: usize = 8;

/// Boost applied when every edge in the cycle carries high weight.
const TIGHT_COUPLING_BOOST: f64 = 0.2;
const HIGH_WEIGHT: f64 = 0.8;

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Unvisited,
    OnStack,
    Done,
}

pub fn find_cycles(store: &GraphStore) -> Result<Vec<Cycle>, CoreError> {
    let edges = store.edges_of_kinds(&CYCLE_KINDS)?;

    // Adjacency in edge insertion order; parallel edges collapse to one
    // neighbor entry carrying the highest weight seen.
    let mut adjacency: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut weights: HashMap<(String, String), Option<f64>> = HashMap::new();
    let mut nodes: BTreeSet<String> = BTreeSet::new();
    for edge in &edges {
        nodes.insert(edge.source.clone());
        nodes.insert(edge.target.clone());
        let neighbors = adjacency.entry(edge.source.clone()).or_default();
        if !neighbors.contains(&edge.target) {
            neighbors.push(edge.target.clone());
        }
        let key = (edge.source.clone(), edge.target.clone());
        let entry = weights.entry(key).or_insert(edge.weight);
        if let (Some(existing), Some(new)) = (*entry, edge.weight) {
            if new > existing {
                *entry = Some(new);
            }
        }
    }

    let mut states: HashMap<String, State> = nodes
        .iter()
        .map(|node| (node.clone(), State::Unvisited))
        .collect();
    let mut seen: HashSet<Vec<String>> = HashSet::new();
    let mut cycles: Vec<Cycle> = Vec::new();

    for start in &nodes {
        if states[start] == State::Unvisited {
            let mut path: Vec<String> = Vec::new();
            dfs(
                start, &adjacency, &weights, &mut states, &mut path, &mut seen, &mut cycles,
            );
        }
    }

    cycles.sort_by(|a, b| {
        b.severity
            .partial_cmp(&a.severity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.nodes.cmp(&b.nodes))
    });
    Ok(cycles)
}

fn dfs(
    node: &str,
    adjacency: &BTreeMap<String, Vec<String>>,
    weights: &HashMap<(String, String), Option<f64>>,
    states: &mut HashMap<String, State>,
    path: &mut Vec<String>,
    seen: &mut HashSet<Vec<String>>,
    cycles: &mut Vec<Cycle>,
) {
    states.insert(node.to_string(), State::OnStack);
    path.push(node.to_string());

    if let Some(neighbors) = adjacency.get(node) {
        for neighbor in neighbors {
            match states.get(neighbor).copied().unwrap_or(State::Unvisited) {
                State::OnStack => {
                    // Back-edge: the path suffix from the neighbor closes a
                    // cycle.
                    let Some(position) = path.iter().position(|entry| entry == neighbor) else {
                        continue;
                    };
                    let cycle = canonicalize(&path[position..]);
                    if seen.insert(cycle.clone()) {
                        let severity = severity_of(&cycle, weights);
                        cycles.push(Cycle {
                            length: cycle.len(),
                            nodes: cycle,
                            severity,
                        });
                    }
                }
                State::Unvisited => {
                    dfs(neighbor, adjacency, weights, states, path, seen, cycles);
                }
                State::Done => {}
            }
        }
    }

    path.pop();
    states.insert(node.to_string(), State::Done);
}

/// Rotate the cycle so its lexicographically smallest node comes first.
fn canonicalize(cycle: &[String]) -> Vec<String> {
    let smallest = cycle
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.cmp(b))
        .map(|(index, _)| index)
        .unwrap_or(0);
    let mut rotated = Vec::with_capacity(cycle.len());
    rotated.extend_from_slice(&cycle[smallest..]);
    rotated.extend_from_slice(&cycle[..smallest]);
    rotated
}

/// Severity grows with cycle length up to a cap, boosted when every edge
/// carries high weight.
fn severity_of(cycle: &[String], weights: &HashMap<(String, String), Option<f64>>) -> f64 {
    let base = (cycle.len().min(LENGTH_CAP) as f64 / LENGTH_CAP as f64) * 0.8;
    let mut all_high = true;
    for index in 0..cycle.len() {
        let source = &cycle[index];
        let target = &cycle[(index + 1) % cycle.len()];
        let weight = weights
            .get(&(source.clone(), target.clone()))
            .copied()
            .flatten();
        if weight.map(|w| w < HIGH_WEIGHT).unwrap_or(true) {
            all_high = false;
            break;
        }
    }
    let severity = if all_high {
        base + TIGHT_COUPLING_BOOST
    } else {
        base
    };
    severity.min(1.0)
}
