//! Hierarchical tree snapshots synthesized from flat manifests.

pub mod synthesizer;

pub use synthesizer::TreeSynthesizer;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::mapping::FileId;
use crate::models::{EntryKind, RevisionId};

/// One entry of a synthesized tree snapshot.
///
/// `revision` is the revision that last modified this entry's content
/// (for synthesized directories: the topologically oldest modifying
/// revision of any descendant). Immutable once the synthesis pass for its
/// snapshot completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeEntry {
    pub file_id: FileId,
    pub kind: EntryKind,
    pub revision: RevisionId,
    pub executable: bool,
    pub text_size: u64,
}

/// A hierarchical snapshot of one flat-system revision, keyed by path.
///
/// The root path `""` always carries an entry with the well-known root
/// file id; every non-root path has a full directory chain up to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeSnapshot {
    /// The revision this snapshot describes.
    pub revision: RevisionId,
    entries: BTreeMap<String, TreeEntry>,
}

impl TreeSnapshot {
    /// An empty snapshot holding only the root entry, attributed to the
    /// snapshot's own revision.
    pub fn new(revision: RevisionId) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            String::new(),
            TreeEntry {
                file_id: FileId::root(),
                kind: EntryKind::Directory,
                revision: revision.clone(),
                executable: false,
                text_size: 0,
            },
        );
        Self { revision, entries }
    }

    pub fn get(&self, path: &str) -> Option<&TreeEntry> {
        self.entries.get(path)
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn insert(&mut self, path: impl Into<String>, entry: TreeEntry) {
        self.entries.insert(path.into(), entry);
    }

    pub(crate) fn set_entry_revision(&mut self, path: &str, revision: RevisionId) {
        if let Some(entry) = self.entries.get_mut(path) {
            entry.revision = revision;
        }
    }

    /// Entries in path order, root first.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &TreeEntry)> {
        self.entries.iter()
    }

    /// Number of entries, the root included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
