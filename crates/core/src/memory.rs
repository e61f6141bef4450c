//! Deterministic in-memory implementations of the repository traits.
//!
//! [`MemFlatRepo`] reproduces the flat system's wire semantics for
//! `branches` (follow first parents to the end of the linear run) and
//! `between` (first-parent probes at distances 1, 2, 4, 8, …), so
//! discovery can be exercised against faithful segment shapes.
//! [`MemTreeRepo`] stages mutations in a write group and discards them on
//! abort. Both are used by the test suite; neither persists anything.

use std::cell::Cell;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::errors::{SourceError, TargetError};
use crate::mapping::FileId;
use crate::models::{
    BranchSegment, ChangelogEntry, Manifest, ManifestEntry, NodeHash, RevisionId,
    RevisionMetadata,
};
use crate::repo::{FlatRepo, TreeRepo};
use crate::tree::TreeSnapshot;

// ---------------------------------------------------------------------------
// Flat source
// ---------------------------------------------------------------------------

/// A file change handed to [`MemFlatRepo::commit`]: `Some((mode, content))`
/// adds or replaces the path, `None` removes it.
pub type FileChange<'a> = Option<(u32, &'a [u8])>;

/// In-memory flat-system repository.
#[derive(Debug, Default)]
pub struct MemFlatRepo {
    parents: HashMap<NodeHash, (NodeHash, NodeHash)>,
    entries: HashMap<NodeHash, ChangelogEntry>,
    manifests: HashMap<NodeHash, Manifest>,
    texts: HashMap<(String, NodeHash), Vec<u8>>,
    /// Nodes with no children, newest-first insertion order.
    children: HashMap<NodeHash, usize>,
    commit_order: Vec<NodeHash>,
    clock: i64,
    /// Number of `branches` requests served (for probing-cost assertions).
    pub branches_calls: Cell<usize>,
    /// Number of `between` requests served.
    pub between_calls: Cell<usize>,
}

/// Derive a stable content hash for a (path, content) pair. Good enough
/// for fixtures; not a real content-addressing scheme.
fn content_node(path: &str, content: &[u8]) -> NodeHash {
    // FNV-1a over path then content, with every output byte derived from
    // the fully absorbed state so short inputs still diverge.
    let mut state: u64 = 0xcbf2_9ce4_8422_2325;
    for b in path.as_bytes().iter().chain([0u8].iter()).chain(content) {
        state ^= u64::from(*b);
        state = state.wrapping_mul(0x0000_0100_0000_01b3);
    }
    let mut bytes = [0u8; 20];
    for (i, byte) in bytes.iter_mut().enumerate() {
        state ^= i as u64;
        state = state.wrapping_mul(0x0000_0100_0000_01b3);
        state ^= state >> 29;
        *byte = (state >> 24) as u8;
    }
    bytes[0] |= 1; // never collide with the sentinel
    NodeHash::from_array(bytes)
}

impl MemFlatRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a revision. The manifest is the first parent's manifest
    /// with `changes` applied on top.
    pub fn commit(
        &mut self,
        node: NodeHash,
        parents: (NodeHash, NodeHash),
        committer: &str,
        message: &str,
        changes: &[(&str, FileChange<'_>)],
    ) {
        let mut manifest = if parents.0.is_null() {
            Manifest::new()
        } else {
            self.manifests.get(&parents.0).cloned().unwrap_or_default()
        };
        let mut files = Vec::new();
        for (path, change) in changes {
            files.push(path.to_string());
            match change {
                Some((mode, content)) => {
                    let file_node = content_node(path, content);
                    manifest.insert(*path, ManifestEntry {
                        node: file_node,
                        mode: *mode,
                    });
                    self.texts
                        .insert((path.to_string(), file_node), content.to_vec());
                }
                None => {
                    manifest.remove(path);
                }
            }
        }
        self.clock += 1;
        self.parents.insert(node, parents);
        self.manifests.insert(node, manifest);
        self.entries.insert(node, ChangelogEntry {
            committer: committer.to_string(),
            message: message.to_string(),
            timestamp: 1_000_000 + self.clock,
            tz_offset_secs: 0,
            files,
        });
        for parent in [parents.0, parents.1] {
            if !parent.is_null() {
                *self.children.entry(parent).or_insert(0) += 1;
            }
        }
        self.commit_order.push(node);
    }

    /// Mutable access to a changelog record, for fixture adjustments.
    pub fn entry_mut(&mut self, node: &NodeHash) -> Option<&mut ChangelogEntry> {
        self.entries.get_mut(node)
    }

    /// Drop the stored text of one file version, so `file_text` fails.
    pub fn poison_text(&mut self, path: &str, content: &[u8]) {
        self.texts.remove(&(path.to_string(), content_node(path, content)));
    }

    fn parents_of(&self, node: &NodeHash) -> Result<(NodeHash, NodeHash), SourceError> {
        if node.is_null() {
            return Ok((NodeHash::NULL, NodeHash::NULL));
        }
        self.parents
            .get(node)
            .copied()
            .ok_or(SourceError::RevisionNotFound(*node))
    }
}

impl FlatRepo for MemFlatRepo {
    fn heads(&self) -> Result<Vec<NodeHash>, SourceError> {
        Ok(self
            .commit_order
            .iter()
            .rev()
            .filter(|n| self.children.get(*n).copied().unwrap_or(0) == 0)
            .copied()
            .collect())
    }

    fn branches(&self, nodes: &[NodeHash]) -> Result<Vec<BranchSegment>, SourceError> {
        self.branches_calls.set(self.branches_calls.get() + 1);
        let mut segments = Vec::with_capacity(nodes.len());
        for head in nodes {
            let mut node = *head;
            loop {
                let (p1, p2) = self.parents_of(&node)?;
                // The linear run ends at a merge or at the start of history.
                if !p2.is_null() || p1.is_null() {
                    segments.push(BranchSegment {
                        head: *head,
                        root: node,
                        parent1: p1,
                        parent2: p2,
                    });
                    break;
                }
                node = p1;
            }
        }
        Ok(segments)
    }

    fn between(
        &self,
        spans: &[(NodeHash, NodeHash)],
    ) -> Result<Vec<Vec<NodeHash>>, SourceError> {
        self.between_calls.set(self.between_calls.get() + 1);
        let mut result = Vec::with_capacity(spans.len());
        for (top, bottom) in spans {
            let mut probes = Vec::new();
            let mut node = *top;
            let mut distance: u64 = 0;
            let mut stride: u64 = 1;
            while node != *bottom && !node.is_null() {
                if distance == stride {
                    probes.push(node);
                    stride *= 2;
                }
                node = self.parents_of(&node)?.0;
                distance += 1;
            }
            result.push(probes);
        }
        Ok(result)
    }

    fn parents(&self, node: &NodeHash) -> Result<(NodeHash, NodeHash), SourceError> {
        self.parents_of(node)
    }

    fn known(&self, nodes: &[NodeHash]) -> Result<HashSet<NodeHash>, SourceError> {
        Ok(nodes
            .iter()
            .filter(|n| n.is_null() || self.parents.contains_key(*n))
            .copied()
            .collect())
    }

    fn changelog_entry(&self, node: &NodeHash) -> Result<ChangelogEntry, SourceError> {
        self.entries
            .get(node)
            .cloned()
            .ok_or(SourceError::RevisionNotFound(*node))
    }

    fn manifest(&self, node: &NodeHash) -> Result<Manifest, SourceError> {
        self.manifests
            .get(node)
            .cloned()
            .ok_or(SourceError::RevisionNotFound(*node))
    }

    fn file_size(&self, path: &str, file_node: &NodeHash) -> Result<u64, SourceError> {
        self.texts
            .get(&(path.to_string(), *file_node))
            .map(|t| t.len() as u64)
            .ok_or_else(|| SourceError::FileNotFound {
                path: path.to_string(),
                node: *file_node,
            })
    }

    fn file_text(&self, path: &str, file_node: &NodeHash) -> Result<Vec<u8>, SourceError> {
        self.texts
            .get(&(path.to_string(), *file_node))
            .cloned()
            .ok_or_else(|| SourceError::FileNotFound {
                path: path.to_string(),
                node: *file_node,
            })
    }
}

// ---------------------------------------------------------------------------
// Tree target
// ---------------------------------------------------------------------------

/// A text record staged or stored by [`MemTreeRepo`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredText {
    pub parents: Vec<RevisionId>,
    pub text: Vec<u8>,
}

#[derive(Debug, Default)]
struct Staged {
    revisions: BTreeMap<RevisionId, (RevisionMetadata, TreeSnapshot)>,
    texts: BTreeMap<(FileId, RevisionId), StoredText>,
}

/// In-memory tree-system repository with write-group semantics.
///
/// Queries answer from committed state only; staged data becomes visible
/// at `commit_write_group` and vanishes at `abort_write_group`.
#[derive(Debug, Default)]
pub struct MemTreeRepo {
    revisions: BTreeMap<RevisionId, (RevisionMetadata, TreeSnapshot)>,
    texts: BTreeMap<(FileId, RevisionId), StoredText>,
    staged: Option<Staged>,
}

impl MemTreeRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed revision count.
    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    /// Committed tree snapshot of one revision.
    pub fn tree(&self, id: &RevisionId) -> Option<&TreeSnapshot> {
        self.revisions.get(id).map(|(_, tree)| tree)
    }

    /// Committed text record, if present.
    pub fn text(&self, file_id: &FileId, revision: &RevisionId) -> Option<&StoredText> {
        self.texts.get(&(file_id.clone(), revision.clone()))
    }
}

impl TreeRepo for MemTreeRepo {
    fn revision_ids(&self) -> Result<Vec<RevisionId>, TargetError> {
        Ok(self.revisions.keys().cloned().collect())
    }

    fn has_revisions(&self, ids: &[RevisionId]) -> Result<HashSet<RevisionId>, TargetError> {
        Ok(ids
            .iter()
            .filter(|id| self.revisions.contains_key(*id))
            .cloned()
            .collect())
    }

    fn parent_map(
        &self,
        ids: &[RevisionId],
    ) -> Result<HashMap<RevisionId, Vec<RevisionId>>, TargetError> {
        let mut map = HashMap::new();
        for id in ids {
            if let Some((meta, _)) = self.revisions.get(id) {
                map.insert(id.clone(), meta.parent_ids.clone());
            }
        }
        Ok(map)
    }

    fn get_revision(&self, id: &RevisionId) -> Result<Option<RevisionMetadata>, TargetError> {
        Ok(self.revisions.get(id).map(|(meta, _)| meta.clone()))
    }

    fn start_write_group(&mut self) -> Result<(), TargetError> {
        if self.staged.is_some() {
            return Err(TargetError::WriteGroupActive);
        }
        self.staged = Some(Staged::default());
        Ok(())
    }

    fn commit_write_group(&mut self) -> Result<(), TargetError> {
        let staged = self.staged.take().ok_or(TargetError::NoWriteGroup)?;
        self.revisions.extend(staged.revisions);
        self.texts.extend(staged.texts);
        Ok(())
    }

    fn abort_write_group(&mut self) -> Result<(), TargetError> {
        if self.staged.take().is_none() {
            return Err(TargetError::NoWriteGroup);
        }
        Ok(())
    }

    fn add_revision(
        &mut self,
        meta: RevisionMetadata,
        tree: TreeSnapshot,
    ) -> Result<(), TargetError> {
        let staged = self.staged.as_mut().ok_or(TargetError::NoWriteGroup)?;
        staged.revisions.insert(meta.id.clone(), (meta, tree));
        Ok(())
    }

    fn insert_file_text(
        &mut self,
        file_id: &FileId,
        revision: &RevisionId,
        parents: &[RevisionId],
        text: &[u8],
    ) -> Result<(), TargetError> {
        let staged = self.staged.as_mut().ok_or(TargetError::NoWriteGroup)?;
        staged.texts.insert(
            (file_id.clone(), revision.clone()),
            StoredText {
                parents: parents.to_vec(),
                text: text.to_vec(),
            },
        );
        Ok(())
    }
}
