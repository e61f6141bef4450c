//! Revision-graph algorithms.
//!
//! [`ancestry`] answers ancestry-or-equal queries over a lazily expanded
//! graph, [`topo`] orders a materialized graph parents-first, and
//! [`discovery`] finds the minimal frontier of source revisions a target
//! is missing.

pub mod ancestry;
pub mod discovery;
pub mod topo;

pub use ancestry::{AncestryIndex, MaterializedGraph, ParentSource};
pub use discovery::{GraphDiffEngine, DEFAULT_BRANCH_BATCH_SIZE};
pub use topo::topo_sort;
