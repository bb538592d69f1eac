//! Typed dependency graph: SQLite-backed property-graph store, the builder
//! that feeds it, and the read-side engines (impact, cycles, paths).
//!
//! Reads may run concurrently with ongoing builds and can observe a
//! partially-imported batch; consistency is eventual across one batch
//! import.

pub mod builder;
pub mod cycles;
pub mod impact;
mod migrations;
pub mod paths;
pub mod store;

pub use builder::GraphBuilder;
pub use impact::{ImpactEngine, DEFAULT_DEPTH, MAX_TRAVERSAL_DEPTH};
pub use store::{EdgeDelta, GraphStore, NodeDelta};
