use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "cqlint",
    version,
    about = "CQL anti-pattern analyzer with dependency-graph impact analysis",
    after_help = r#"Examples:
  cqlint analyze --repo .
  cqlint analyze --repo . --no-graph
  cqlint impact --repo . --target app/models.py --depth 3
  cqlint cycles --repo .
  cqlint path --repo . --source app/api.py --target app/models.py
  cqlint overview --repo .
"#
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Analyze every source file and rebuild the dependency graph.
    Analyze {
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
        /// Include files ignored by .gitignore.
        #[arg(long)]
        no_ignore: bool,
        /// Skip graph building; detection results only.
        #[arg(long)]
        no_graph: bool,
        /// Override the worker count.
        #[arg(long)]
        workers: Option<usize>,
    },
    /// What breaks if this node changes.
    Impact {
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
        /// Target node id (a file path, `file::Symbol`, or query id).
        #[arg(long)]
        target: String,
        /// Traversal depth (hard maximum 10).
        #[arg(long, default_value_t = 3)]
        depth: usize,
        /// Only direct (distance 1) dependents.
        #[arg(long)]
        direct_only: bool,
    },
    /// Elementary cycles in the DEPENDS_ON/IMPORTS subgraph.
    Cycles {
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Enumerate paths between two nodes.
    Path {
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long)]
        source: String,
        #[arg(long)]
        target: String,
        #[arg(long, default_value_t = 6)]
        max_depth: usize,
    },
    /// Node and edge counts of the stored graph.
    Overview {
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
    },
}
