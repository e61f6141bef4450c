//! HgBzrSync core library.
//!
//! This crate bridges a flat-manifest version control model onto a
//! hierarchical tree model: identity mapping between the two id spaces,
//! missing-revision discovery, tree synthesis from flat manifests, and the
//! fetch engine that ties them together over a pair of repository traits.

pub mod config;
pub mod errors;
pub mod graph;
pub mod mapping;
pub mod memory;
pub mod models;
pub mod repo;
pub mod sync_engine;
pub mod tree;

// Re-exports for convenience.
pub use config::BridgeConfig;
pub use errors::BridgeError;
pub use graph::{AncestryIndex, GraphDiffEngine};
pub use mapping::IdentityMapper;
pub use repo::{FlatRepo, TreeRepo};
pub use sync_engine::{FetchSpec, SyncEngine};
pub use tree::{TreeSnapshot, TreeSynthesizer};
