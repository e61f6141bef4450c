//! Interfaces to the out-of-scope repository collaborators.
//!
//! The core never talks to a real VCS engine directly; it is written
//! against these traits. [`FlatRepo`] is the source query interface of
//! the flat system, [`TreeRepo`] the target interface of the tree system
//! (including its write-group transaction bracket). Locking, transport,
//! and on-disk storage live behind the implementations.

use std::collections::{HashMap, HashSet};

use crate::errors::{SourceError, TargetError};
use crate::mapping::FileId;
use crate::models::{
    BranchSegment, ChangelogEntry, Manifest, NodeHash, RevisionId, RevisionMetadata,
};
use crate::tree::TreeSnapshot;

// ---------------------------------------------------------------------------
// Source (flat system)
// ---------------------------------------------------------------------------

/// Query interface of the flat-system source repository.
pub trait FlatRepo {
    /// The current branch heads.
    fn heads(&self) -> Result<Vec<NodeHash>, SourceError>;

    /// The branch segments covering `nodes`: for each node, the maximal
    /// linear run it sits at the head of, described as
    /// (head, root, parent1, parent2).
    fn branches(&self, nodes: &[NodeHash]) -> Result<Vec<BranchSegment>, SourceError>;

    /// Log-spaced probe ids per (head, root) span: first-parent ancestors
    /// of `head` at distances 1, 2, 4, 8, … strictly between the two ends.
    fn between(
        &self,
        spans: &[(NodeHash, NodeHash)],
    ) -> Result<Vec<Vec<NodeHash>>, SourceError>;

    /// The two parents of a revision; the sentinel stands in for an
    /// absent parent.
    fn parents(&self, node: &NodeHash) -> Result<(NodeHash, NodeHash), SourceError>;

    /// Which of `nodes` exist in the source.
    fn known(&self, nodes: &[NodeHash]) -> Result<HashSet<NodeHash>, SourceError>;

    /// The changelog record of a revision.
    fn changelog_entry(&self, node: &NodeHash) -> Result<ChangelogEntry, SourceError>;

    /// The flat manifest of a revision, keyed by changelog id.
    fn manifest(&self, node: &NodeHash) -> Result<Manifest, SourceError>;

    /// Size in bytes of one file version.
    fn file_size(&self, path: &str, file_node: &NodeHash) -> Result<u64, SourceError>;

    /// Raw content of one file version. Content transfer mechanics are
    /// opaque to the core; retrieval is keyed by path and content hash.
    fn file_text(&self, path: &str, file_node: &NodeHash) -> Result<Vec<u8>, SourceError>;
}

// ---------------------------------------------------------------------------
// Target (tree system)
// ---------------------------------------------------------------------------

/// Interface of the tree-system target repository.
///
/// Mutations are only valid inside a write group; implementations must
/// guarantee that `abort_write_group` leaves no partial state visible.
pub trait TreeRepo {
    /// Every revision id the target knows.
    fn revision_ids(&self) -> Result<Vec<RevisionId>, TargetError>;

    /// Which of `ids` the target knows.
    fn has_revisions(&self, ids: &[RevisionId]) -> Result<HashSet<RevisionId>, TargetError>;

    /// Parents of each of `ids` (arbitrary arity in the tree system).
    fn parent_map(
        &self,
        ids: &[RevisionId],
    ) -> Result<HashMap<RevisionId, Vec<RevisionId>>, TargetError>;

    /// Metadata of one revision, or `None` if unknown.
    fn get_revision(&self, id: &RevisionId) -> Result<Option<RevisionMetadata>, TargetError>;

    /// Open the write group. At most one may be active.
    fn start_write_group(&mut self) -> Result<(), TargetError>;

    /// Commit everything staged since `start_write_group`.
    fn commit_write_group(&mut self) -> Result<(), TargetError>;

    /// Discard everything staged since `start_write_group`.
    fn abort_write_group(&mut self) -> Result<(), TargetError>;

    /// Stage a revision with its synthesized tree snapshot.
    fn add_revision(
        &mut self,
        meta: RevisionMetadata,
        tree: TreeSnapshot,
    ) -> Result<(), TargetError>;

    /// Stage one file text under its stable file id.
    fn insert_file_text(
        &mut self,
        file_id: &FileId,
        revision: &RevisionId,
        parents: &[RevisionId],
        text: &[u8],
    ) -> Result<(), TargetError>;
}
