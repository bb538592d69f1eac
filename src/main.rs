use anyhow::Result;
use clap::Parser;
use cqlint::detect::Registry;
use cqlint::extract::scan;
use cqlint::graph::{paths, GraphStore, ImpactEngine};
use cqlint::pipeline::batch::BatchRunner;
use cqlint::pipeline::Pipeline;
use cqlint::{cli, graph};
use std::path::PathBuf;
use std::sync::Arc;

fn default_db_path(repo: &PathBuf) -> PathBuf {
    repo.join(".cqlint").join("graph.sqlite")
}

fn main() -> Result<()> {
    let args = cli::Args::parse();

    match args.command {
        cli::Command::Analyze {
            repo,
            db,
            no_ignore,
            no_graph,
            workers,
        } => {
            let db_path = db.unwrap_or_else(|| default_db_path(&repo));
            let files = scan::scan_repo_with_options(&repo, scan::ScanOptions::new(no_ignore))?;
            eprintln!("cqlint: analyzing {} files", files.len());

            let store = if no_graph {
                None
            } else {
                Some(Arc::new(GraphStore::new(&db_path)?))
            };
            let pipeline = Arc::new(Pipeline::new(Arc::new(Registry::rules_only())));
            let mut runner = BatchRunner::new(pipeline, store);
            if let Some(workers) = workers {
                runner = runner.with_workers(workers);
            }
            let result = runner.run(&repo, &files)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.failures.is_empty() {
                std::process::exit(1);
            }
            Ok(())
        }
        cli::Command::Impact {
            repo,
            db,
            target,
            depth,
            direct_only,
        } => {
            let db_path = db.unwrap_or_else(|| default_db_path(&repo));
            let store = GraphStore::new(&db_path)?;
            let engine = ImpactEngine::new(&store);
            let result = engine.analyze(&target, depth, !direct_only)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        cli::Command::Cycles { repo, db } => {
            let db_path = db.unwrap_or_else(|| default_db_path(&repo));
            let store = GraphStore::new(&db_path)?;
            let cycles = graph::cycles::find_cycles(&store)?;
            println!("{}", serde_json::to_string_pretty(&cycles)?);
            Ok(())
        }
        cli::Command::Path {
            repo,
            db,
            source,
            target,
            max_depth,
        } => {
            let db_path = db.unwrap_or_else(|| default_db_path(&repo));
            let store = GraphStore::new(&db_path)?;
            let result = paths::find_paths(&store, &source, &target, max_depth)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        cli::Command::Overview { repo, db } => {
            let db_path = db.unwrap_or_else(|| default_db_path(&repo));
            let store = GraphStore::new(&db_path)?;
            let overview = store.overview()?;
            println!("{}", serde_json::to_string_pretty(&overview)?);
            Ok(())
        }
    }
}
