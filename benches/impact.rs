use criterion::{black_box, criterion_group, criterion_main, Criterion};
use cqlint::graph::{cycles, paths, EdgeDelta, GraphStore, ImpactEngine, NodeDelta};
use cqlint::model::{EdgeKind, NodeKind};
use std::path::PathBuf;

fn temp_db_path() -> PathBuf {
    std::env::temp_dir().join(format!(
        "cqlint-bench-{}.sqlite",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ))
}

/// Layered synthetic graph: `width` files per layer, each depending on two
/// files of the layer below.
fn seed_graph(store: &GraphStore, layers: usize, width: usize) {
    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    for layer in 0..layers {
        for index in 0..width {
            let id = format!("layer{layer}/file{index}.py");
            nodes.push(NodeDelta {
                id: id.clone(),
                label: format!("file{index}.py"),
                kind: NodeKind::File,
                properties: serde_json::Map::from_iter([(
                    "complexity".to_string(),
                    serde_json::json!((index % 20) + 1),
                )]),
            });
            if layer > 0 {
                for offset in 0..2 {
                    let target = format!("layer{}/file{}.py", layer - 1, (index + offset) % width);
                    edges.push(EdgeDelta {
                        source: id.clone(),
                        target,
                        kind: EdgeKind::DependsOn,
                        weight: Some(0.5 + (index % 5) as f64 / 10.0),
                        properties: serde_json::Map::new(),
                    });
                }
            }
        }
    }
    // A few rings for the cycle scan.
    for index in 0..width.min(8) {
        edges.push(EdgeDelta {
            source: format!("layer0/file{index}.py"),
            target: format!("layer{}/file{index}.py", layers - 1),
            kind: EdgeKind::DependsOn,
            weight: Some(0.9),
            properties: serde_json::Map::new(),
        });
    }
    store.upsert_nodes(&nodes).unwrap();
    store.upsert_edges(&edges).unwrap();
}

fn bench_impact_depth(c: &mut Criterion) {
    let db_path = temp_db_path();
    let store = GraphStore::new(&db_path).unwrap();
    seed_graph(&store, 6, 50);
    let engine = ImpactEngine::new(&store);

    let mut group = c.benchmark_group("impact_depth");
    for depth in [1usize, 3, 5] {
        group.bench_with_input(format!("depth_{depth}"), &depth, |b, &depth| {
            b.iter(|| {
                let result = engine.analyze(black_box("layer0/file0.py"), depth, true);
                black_box(result)
            })
        });
    }
    group.finish();
    let _ = std::fs::remove_file(&db_path);
}

fn bench_cycles(c: &mut Criterion) {
    let db_path = temp_db_path();
    let store = GraphStore::new(&db_path).unwrap();
    seed_graph(&store, 6, 50);

    c.bench_function("cycle_scan", |b| {
        b.iter(|| black_box(cycles::find_cycles(black_box(&store))))
    });
    let _ = std::fs::remove_file(&db_path);
}

fn bench_paths(c: &mut Criterion) {
    let db_path = temp_db_path();
    let store = GraphStore::new(&db_path).unwrap();
    seed_graph(&store, 6, 50);

    c.bench_function("path_enumeration", |b| {
        b.iter(|| {
            let result = paths::find_paths(
                black_box(&store),
                black_box("layer5/file0.py"),
                black_box("layer0/file0.py"),
                6,
            );
            black_box(result)
        })
    });
    let _ = std::fs::remove_file(&db_path);
}

criterion_group!(benches, bench_impact_depth, bench_cycles, bench_paths);
criterion_main!(benches);
