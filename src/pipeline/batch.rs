//! Batch orchestrator.
//!
//! Fans a file set out across a fixed-size worker pool (one file per task,
//! shallow prefetch via work stealing), isolates per-file failures, and
//! merges the survivors into one run result. Graph writes from
//! concurrently completing workers serialize inside the store.

use crate::config::Config;
use crate::error::CoreError;
use crate::extract::scan::ScannedFile;
use crate::graph::{GraphBuilder, GraphStore};
use crate::model::{AnalysisResult, FileFailure, RunResult};
use crate::pipeline::deadline::Deadline;
use crate::pipeline::Pipeline;
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct BatchRunner {
    pipeline: Arc<Pipeline>,
    store: Option<Arc<GraphStore>>,
    workers: usize,
    soft_limit: Duration,
    hard_limit: Duration,
    cancel: Arc<AtomicBool>,
}

impl BatchRunner {
    pub fn new(pipeline: Arc<Pipeline>, store: Option<Arc<GraphStore>>) -> Self {
        let config = Config::get();
        Self {
            pipeline,
            store,
            workers: config.workers.max(1),
            soft_limit: Duration::from_millis(config.soft_limit_ms),
            hard_limit: Duration::from_millis(config.hard_limit_ms),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_limits(mut self, soft: Duration, hard: Duration) -> Self {
        self.soft_limit = soft;
        self.hard_limit = hard;
        self
    }

    /// Handle for cancelling an in-flight run: no new file tasks are
    /// dispatched once set; in-flight tasks drain.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Analyze every scanned file, one task per file. Per-file failures
    /// never abort the batch; they are recorded and counted.
    pub fn run(&self, repo_root: &std::path::Path, files: &[ScannedFile]) -> Result<RunResult> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .context("build worker pool")?;

        let outcomes: Vec<(String, Result<AnalysisResult, CoreError>)> = pool.install(|| {
            files
                .par_iter()
                .map(|file| {
                    if self.cancel.load(Ordering::Relaxed) {
                        return (
                            file.rel_path.clone(),
                            Err(CoreError::Cancelled {
                                path: file.rel_path.clone(),
                            }),
                        );
                    }
                    let deadline = Deadline::start(self.soft_limit, self.hard_limit);
                    let outcome = self.analyze_one(repo_root, file, &deadline);
                    (file.rel_path.clone(), outcome)
                })
                .collect()
        });

        let mut per_file = Vec::new();
        let mut failures = Vec::new();
        for (path, outcome) in outcomes {
            match outcome {
                Ok(result) => per_file.push(result),
                Err(err) => {
                    eprintln!("cqlint: {path}: {err}");
                    failures.push(FileFailure {
                        path,
                        error: err.to_string(),
                    });
                }
            }
        }

        let successful = per_file.len();
        Ok(RunResult {
            per_file,
            failures,
            successful,
            total: files.len(),
        })
    }

    fn analyze_one(
        &self,
        repo_root: &std::path::Path,
        file: &ScannedFile,
        deadline: &Deadline,
    ) -> Result<AnalysisResult, CoreError> {
        let (result, extracted) =
            self.pipeline
                .analyze_file(repo_root, &file.rel_path, deadline)?;
        if let Some(store) = &self.store {
            deadline.check_hard(&file.rel_path)?;
            let builder = GraphBuilder::new(store);
            builder.apply(&file.rel_path, &file.language, &file.hash, &extracted)?;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Registry;
    use crate::extract::scan;
    use std::path::Path;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    fn runner(store: Option<Arc<GraphStore>>) -> BatchRunner {
        let pipeline = Arc::new(Pipeline::new(Arc::new(Registry::rules_only())));
        BatchRunner::new(pipeline, store).with_workers(2)
    }

    #[test]
    fn run_merges_per_file_results() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "bad.py",
            "def f(s):\n    s.execute(\"SELECT * FROM users ALLOW FILTERING\")\n",
        );
        write(dir.path(), "clean.py", "def g():\n    return 1\n");
        let files = scan::scan_repo(dir.path()).unwrap();

        let result = runner(None).run(dir.path(), &files).unwrap();
        assert_eq!(result.total, 2);
        assert_eq!(result.successful, 2);
        assert!(result.failures.is_empty());

        let bad = result
            .per_file
            .iter()
            .find(|r| r.file_path == "bad.py")
            .unwrap();
        assert!(!bad.findings.is_empty());
        let clean = result
            .per_file
            .iter()
            .find(|r| r.file_path == "clean.py")
            .unwrap();
        assert!(clean.findings.is_empty());
    }

    #[test]
    fn unreadable_file_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "ok.py", "def g():\n    return 1\n");
        let mut files = scan::scan_repo(dir.path()).unwrap();
        // A file that disappears between scan and analysis.
        files.push(ScannedFile {
            rel_path: "gone.py".to_string(),
            abs_path: dir.path().join("gone.py"),
            hash: "0".repeat(64),
            language: "python".to_string(),
        });

        let result = runner(None).run(dir.path(), &files).unwrap();
        assert_eq!(result.total, 2);
        assert_eq!(result.successful, 1);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].path, "gone.py");
        assert!(result.failures[0].error.contains("gone.py"));
    }

    #[test]
    fn cancellation_stops_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..8 {
            write(dir.path(), &format!("f{i}.py"), "def g():\n    return 1\n");
        }
        let files = scan::scan_repo(dir.path()).unwrap();
        let runner = runner(None);
        runner.cancel_flag().store(true, Ordering::Relaxed);

        let result = runner.run(dir.path(), &files).unwrap();
        assert_eq!(result.successful, 0);
        assert_eq!(result.failures.len(), 8);
        assert!(result.failures[0].error.contains("cancelled"));
    }

    #[test]
    fn run_populates_the_graph() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "repo.py",
            concat!(
                "class Repo:\n",
                "    def find(self, s):\n",
                "        return s.execute(\"SELECT * FROM t WHERE id = ?\")\n",
            ),
        );
        let files = scan::scan_repo(dir.path()).unwrap();
        let store = Arc::new(GraphStore::new(&dir.path().join("graph.sqlite")).unwrap());

        let result = runner(Some(Arc::clone(&store))).run(dir.path(), &files).unwrap();
        assert_eq!(result.successful, 1);

        let overview = store.overview().unwrap();
        assert!(overview.nodes >= 3);
        assert_eq!(overview.nodes_by_kind.get("QUERY"), Some(&1));
    }
}
