use thiserror::Error;

/// Typed failure conditions for the core pipeline and graph engine.
///
/// Semantic-detector degradation is deliberately NOT represented here: a
/// semantic call that exhausts its retries is a per-detector outcome
/// (`detect::semantic::SemanticOutcome::Degraded`), never an error crossing
/// the detector boundary.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The file could not be read at all. Fatal for that file only.
    #[error("read {path}: {source}")]
    Extraction {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Graph store write or read failed.
    #[error("graph store: {0}")]
    GraphWrite(#[from] rusqlite::Error),

    /// Read-pool checkout failed.
    #[error("graph store pool: {0}")]
    Pool(#[from] r2d2::Error),

    /// Store directory could not be created.
    #[error("create store directory {path}: {source}")]
    StoreDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Query parser grammar failed to load.
    #[error("initialize parser: {0}")]
    Parser(String),

    /// Query target absent from the graph. Distinguished from an
    /// empty-but-valid result.
    #[error("node not found: {0}")]
    NotFound(String),

    /// Requested depth beyond the hard maximum. Rejected before traversal
    /// starts, not silently clamped.
    #[error("traversal depth {requested} exceeds hard maximum {max}")]
    TraversalBoundExceeded { requested: usize, max: usize },

    /// The per-file hard time limit fired. Reported as a per-file failure,
    /// never a pipeline abort.
    #[error("analysis of {path} exceeded the hard time limit")]
    DeadlineExceeded { path: String },

    /// Batch cancellation observed before this task was dispatched.
    #[error("cancelled before dispatch: {path}")]
    Cancelled { path: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_and_bound_are_distinguishable() {
        let a = CoreError::NotFound("app/missing.py".to_string());
        let b = CoreError::TraversalBoundExceeded {
            requested: 12,
            max: 10,
        };
        assert!(matches!(a, CoreError::NotFound(_)));
        assert!(matches!(b, CoreError::TraversalBoundExceeded { .. }));
        assert!(a.to_string().contains("app/missing.py"));
        assert!(b.to_string().contains("12"));
    }
}
