//! Error types for the HgBzrSync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`BridgeError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

use crate::models::{NodeHash, RevisionId};

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Target(#[from] TargetError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Identity mapping errors
// ---------------------------------------------------------------------------

/// Errors from the id-space translation layer.
///
/// These are never recovered locally: they indicate a mapping-version
/// mismatch between the two repositories and must reach the caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    /// A tree-system revision id does not match any registered mapping
    /// version, or its payload is not valid hex of the expected length.
    #[error("invalid revision id '{id}': {detail}")]
    InvalidRevisionId { id: String, detail: String },

    /// A path-derived file id failed to decode.
    #[error("malformed file id '{id}': {detail}")]
    MalformedFileId { id: String, detail: String },
}

// ---------------------------------------------------------------------------
// Revision graph errors
// ---------------------------------------------------------------------------

/// Errors from ancestry queries and missing-revision discovery.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A revision claimed as a parent is absent from both the local and the
    /// remote repository after graph expansion. Fatal for the current
    /// synchronization call; the in-flight write group must be aborted.
    #[error("revision {0} claimed as a parent is absent from both repositories")]
    AncestryInconsistency(RevisionId),

    /// The revision graph contains a cycle and cannot be ordered.
    #[error("revision graph contains a cycle ({remaining} revisions unordered)")]
    Cycle { remaining: usize },

    /// Underlying source error during graph expansion.
    #[error("graph source error: {0}")]
    Source(#[from] SourceError),

    /// Underlying target error during graph expansion.
    #[error("graph target error: {0}")]
    Target(#[from] TargetError),

    /// Id translation error during graph expansion.
    #[error("graph mapping error: {0}")]
    Mapping(#[from] MappingError),
}

// ---------------------------------------------------------------------------
// Tree synthesis errors
// ---------------------------------------------------------------------------

/// Errors from manifest-to-tree synthesis.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// A manifest entry carries a mode encoding that does not decode to any
    /// known entry kind. Malformed input, fatal for that revision.
    #[error("malformed manifest entry for '{path}': unrecognized mode {mode:#o}")]
    MalformedManifestEntry { path: String, mode: u32 },

    /// Underlying source error while reading manifests or changelog entries.
    #[error("synthesis source error: {0}")]
    Source(#[from] SourceError),

    /// Ancestry error while resolving modifying revisions.
    #[error("synthesis graph error: {0}")]
    Graph(#[from] GraphError),

    /// Id translation error during synthesis.
    #[error("synthesis mapping error: {0}")]
    Mapping(#[from] MappingError),
}

// ---------------------------------------------------------------------------
// Source (flat system) errors
// ---------------------------------------------------------------------------

/// Errors from the flat-system source collaborator.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source could not be reached. Retryable by caller policy.
    #[error("source unreachable: {0}")]
    Unreachable(String),

    /// The source answered, but its data contradicts itself. Not retried.
    #[error("source repository inconsistent: {0}")]
    Inconsistent(String),

    /// The requested revision does not exist in the source.
    #[error("revision {0} not found in source")]
    RevisionNotFound(NodeHash),

    /// The requested file version does not exist in the source.
    #[error("file '{path}' at node {node} not found in source")]
    FileNotFound { path: String, node: NodeHash },

    /// Generic I/O wrapper.
    #[error("source I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Target (tree system) errors
// ---------------------------------------------------------------------------

/// Errors from the tree-system target collaborator.
#[derive(Debug, Error)]
pub enum TargetError {
    /// The requested revision does not exist in the target.
    #[error("revision {0} not found in target")]
    RevisionNotFound(RevisionId),

    /// A mutating operation was attempted outside a write group.
    #[error("no write group is active")]
    NoWriteGroup,

    /// `start_write_group` was called while a group was already open.
    #[error("a write group is already active")]
    WriteGroupActive,

    /// Generic I/O wrapper.
    #[error("target I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Sync engine errors
// ---------------------------------------------------------------------------

/// Errors from the fetch orchestration.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Discovery or graph-building failure.
    #[error("sync graph error: {0}")]
    Graph(#[from] GraphError),

    /// Tree synthesis failure for one of the fetched revisions.
    #[error("sync synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    /// Source failure during content copy.
    #[error("sync source error: {0}")]
    Source(#[from] SourceError),

    /// Target failure during insertion or write-group handling.
    #[error("sync target error: {0}")]
    Target(#[from] TargetError),

    /// Id translation failure.
    #[error("sync mapping error: {0}")]
    Mapping(#[from] MappingError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
