//! Manifest-to-tree synthesis.
//!
//! The flat system has no native tree object, so a hierarchical snapshot
//! with per-entry "last modified" attribution is reconstructed from the
//! flat manifest and the ancestry graph alone. Proof-of-concept
//! complexity: a backward ancestry walk per file, with manifests memoized
//! by changelog id for the lifetime of one synthesizer.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::rc::Rc;

use tracing::debug;

use crate::errors::SynthesisError;
use crate::graph::{AncestryIndex, MaterializedGraph};
use crate::mapping::IdentityMapper;
use crate::models::{EntryKind, Manifest, NodeHash, RevisionId};
use crate::repo::FlatRepo;

use super::{TreeEntry, TreeSnapshot};

/// Parent directory of a path within the snapshot (`""` for top-level
/// paths).
fn dirname(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Builds tree snapshots for flat-system revisions.
///
/// Caches (manifests, the ancestry index built per call) are scoped to
/// one synthesizer and safe to discard; build a fresh synthesizer per
/// operation.
pub struct TreeSynthesizer<'a, S: FlatRepo + ?Sized> {
    source: &'a S,
    mapper: &'a IdentityMapper,
    /// Manifests addressed by changelog id.
    manifests: RefCell<HashMap<NodeHash, Rc<Manifest>>>,
}

impl<'a, S: FlatRepo + ?Sized> TreeSynthesizer<'a, S> {
    pub fn new(source: &'a S, mapper: &'a IdentityMapper) -> Self {
        Self {
            source,
            mapper,
            manifests: RefCell::new(HashMap::new()),
        }
    }

    fn manifest_for(&self, node: &NodeHash) -> Result<Rc<Manifest>, SynthesisError> {
        if let Some(manifest) = self.manifests.borrow().get(node) {
            return Ok(Rc::clone(manifest));
        }
        let manifest = Rc::new(self.source.manifest(node)?);
        self.manifests
            .borrow_mut()
            .insert(*node, Rc::clone(&manifest));
        Ok(manifest)
    }

    /// Synthesize the hierarchical snapshot of one revision.
    pub fn synthesize(&self, node: &NodeHash) -> Result<TreeSnapshot, SynthesisError> {
        let revision = self.mapper.revision_to_local(node);
        debug!(revision = %revision, "synthesizing tree snapshot");

        let manifest = self.manifest_for(node)?;
        let graph = self.revision_graph(node)?;
        let parent_source = MaterializedGraph(&graph);
        let index = AncestryIndex::new(&parent_source);

        let mut tree = TreeSnapshot::new(revision);
        // Chosen modifying revision per synthesized directory; entries get
        // their final revision assigned from here once all files are in.
        let mut directories: HashMap<String, RevisionId> = HashMap::new();

        for (path, entry) in manifest.iter() {
            let kind = entry
                .kind()
                .ok_or_else(|| SynthesisError::MalformedManifestEntry {
                    path: path.clone(),
                    mode: entry.mode,
                })?;

            let modified_node = self.find_modifying_revision(node, path, &entry.node, &index)?;
            let introduced_node = self.find_introducing_revision(node, path, &index)?;
            let introduced = self.mapper.revision_to_local(&introduced_node);

            self.add_parent_dirs(path, &introduced, &mut tree, &mut directories, &index)?;

            let text_size = self.source.file_size(path, &entry.node)?;
            tree.insert(
                path.clone(),
                TreeEntry {
                    file_id: self.mapper.file_id_for_path(path),
                    kind,
                    revision: self.mapper.revision_to_local(&modified_node),
                    executable: entry.executable(),
                    text_size,
                },
            );
        }

        for (dir, dir_revision) in directories {
            tree.set_entry_revision(&dir, dir_revision);
        }
        Ok(tree)
    }

    /// The revision graph reachable from `node`, in the tree id space.
    fn revision_graph(
        &self,
        node: &NodeHash,
    ) -> Result<HashMap<RevisionId, Vec<RevisionId>>, SynthesisError> {
        let mut graph = HashMap::new();
        let mut visited: HashSet<NodeHash> = HashSet::new();
        let mut pending: BTreeSet<NodeHash> = BTreeSet::new();
        pending.insert(*node);
        while let Some(current) = pending.pop_first() {
            visited.insert(current);
            let (p1, p2) = self.source.parents(&current)?;
            let parents: Vec<RevisionId> = [p1, p2]
                .into_iter()
                .filter(|p| !p.is_null())
                .map(|p| self.mapper.revision_to_local(&p))
                .collect();
            graph.insert(self.mapper.revision_to_local(&current), parents);
            for parent in [p1, p2] {
                if !parent.is_null() && !visited.contains(&parent) {
                    pending.insert(parent);
                }
            }
        }
        Ok(graph)
    }

    /// The revision that introduced the content currently at `path`.
    ///
    /// Walks the ancestors whose manifest carries the same content hash;
    /// a matching revision none of whose parents still match is a
    /// boundary. Merge history can produce a boundary per side when the
    /// same content appears independently, so boundaries are reduced with
    /// [`pick_best_creator_revision`].
    fn find_modifying_revision(
        &self,
        head: &NodeHash,
        path: &str,
        file_node: &NodeHash,
        index: &AncestryIndex<'_>,
    ) -> Result<NodeHash, SynthesisError> {
        let mut boundaries: Vec<NodeHash> = Vec::new();
        let mut done: HashSet<NodeHash> = HashSet::new();
        let mut pending: BTreeSet<NodeHash> = BTreeSet::new();
        pending.insert(*head);
        while let Some(current) = pending.pop_first() {
            if !done.insert(current) {
                continue;
            }
            let (p1, p2) = self.source.parents(&current)?;
            let mut has_matching_parent = false;
            for parent in [p1, p2] {
                if parent.is_null() {
                    continue;
                }
                let manifest = self.manifest_for(&parent)?;
                if manifest.get(path).map(|e| e.node) == Some(*file_node) {
                    has_matching_parent = true;
                    pending.insert(parent);
                }
            }
            if !has_matching_parent {
                boundaries.push(current);
            }
        }
        self.best_boundary(index, boundaries, head)
    }

    /// The first revision ever to contain `path` on any ancestor walk
    /// from `head`.
    ///
    /// Distinct from the modifying walk: content can be reintroduced with
    /// the same hash. Tracks (child, revision) pairs so a boundary where
    /// the path disappears names the child that still carried it. Merge
    /// history can produce one boundary per side; the ancestry-oldest
    /// boundary wins, with the revision-id total order breaking ties, so
    /// the result is independent of traversal order.
    fn find_introducing_revision(
        &self,
        head: &NodeHash,
        path: &str,
        index: &AncestryIndex<'_>,
    ) -> Result<NodeHash, SynthesisError> {
        let mut boundaries: Vec<NodeHash> = Vec::new();
        let mut done: HashSet<NodeHash> = HashSet::new();
        let mut pending: BTreeSet<(Option<NodeHash>, NodeHash)> = BTreeSet::new();
        pending.insert((None, *head));
        while let Some((child, current)) = pending.pop_first() {
            if current.is_null() {
                continue;
            }
            let manifest = self.manifest_for(&current)?;
            done.insert(current);
            if !manifest.contains_path(path) {
                // The path is absent here: its presence ends at the child.
                boundaries.push(child.unwrap_or(*head));
                continue;
            }
            let (p1, p2) = self.source.parents(&current)?;
            if p1.is_null() && p2.is_null() {
                // Reached a root with the path still present.
                boundaries.push(current);
                continue;
            }
            for parent in [p1, p2] {
                if !done.contains(&parent) {
                    pending.insert((Some(current), parent));
                }
            }
        }

        self.best_boundary(index, boundaries, head)
    }

    /// Reduce a set of candidate boundary revisions to one winner:
    /// ancestry-oldest first, the revision-id total order on ties. The
    /// result is independent of the order boundaries were found in.
    fn best_boundary(
        &self,
        index: &AncestryIndex<'_>,
        boundaries: Vec<NodeHash>,
        head: &NodeHash,
    ) -> Result<NodeHash, SynthesisError> {
        let mut best: Option<NodeHash> = None;
        for boundary in boundaries {
            best = Some(match best {
                None => boundary,
                Some(current_best) => {
                    let b = self.mapper.revision_to_local(&boundary);
                    let c = self.mapper.revision_to_local(&current_best);
                    match pick_best_creator_revision(index, &c, &b)? {
                        winner if winner == b => boundary,
                        _ => current_best,
                    }
                }
            });
        }
        Ok(best.unwrap_or(*head))
    }

    /// Ensure every ancestor directory of `path` exists in the snapshot,
    /// updating each one's chosen modifying revision with `candidate` and
    /// propagating upward while the choice keeps changing.
    ///
    /// Explicit worklist over path components; the tree can be deeper
    /// than the call stack should be.
    fn add_parent_dirs(
        &self,
        path: &str,
        candidate: &RevisionId,
        tree: &mut TreeSnapshot,
        directories: &mut HashMap<String, RevisionId>,
        index: &AncestryIndex<'_>,
    ) -> Result<(), SynthesisError> {
        let mut dir = dirname(path);
        while !dir.is_empty() {
            match directories.get(dir) {
                Some(current_best) => {
                    let best = pick_best_creator_revision(index, current_best, candidate)?;
                    if best == *current_best {
                        // No change here, so nothing to push further up.
                        break;
                    }
                    directories.insert(dir.to_string(), candidate.clone());
                }
                None => {
                    directories.insert(dir.to_string(), candidate.clone());
                    tree.insert(
                        dir.to_string(),
                        TreeEntry {
                            file_id: self.mapper.file_id_for_path(dir),
                            kind: EntryKind::Directory,
                            revision: candidate.clone(),
                            executable: false,
                            text_size: 0,
                        },
                    );
                }
            }
            dir = dirname(dir);
        }
        Ok(())
    }
}

/// Pick the better creator revision of two candidates.
///
/// An ancestor wins over its descendant; when neither is an ancestor of
/// the other, the lesser revision id in the total order wins.
fn pick_best_creator_revision(
    index: &AncestryIndex<'_>,
    a: &RevisionId,
    b: &RevisionId,
) -> Result<RevisionId, SynthesisError> {
    if index.is_ancestor_or_equal(a, b)? {
        Ok(a.clone())
    } else if index.is_ancestor_or_equal(b, a)? {
        Ok(b.clone())
    } else if a < b {
        Ok(a.clone())
    } else {
        Ok(b.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemFlatRepo;
    use crate::models::MODE_FILE;

    fn node(n: u8) -> NodeHash {
        NodeHash::from_array([n; 20])
    }

    fn local(mapper: &IdentityMapper, n: u8) -> RevisionId {
        mapper.revision_to_local(&node(n))
    }

    #[test]
    fn test_dirname() {
        assert_eq!(dirname("a/b/c.txt"), "a/b");
        assert_eq!(dirname("a"), "");
        assert_eq!(dirname(""), "");
    }

    #[test]
    fn test_new_directory_attributed_to_introducing_revision() {
        let mut repo = MemFlatRepo::new();
        repo.commit(
            node(1),
            (NodeHash::NULL, NodeHash::NULL),
            "alice",
            "add top",
            &[("top.txt", Some((0o100644, b"top".as_slice())))],
        );
        repo.commit(
            node(2),
            (node(1), NodeHash::NULL),
            "alice",
            "add a/b.txt",
            &[("a/b.txt", Some((0o100644, b"b".as_slice())))],
        );

        let mapper = IdentityMapper::new();
        let synth = TreeSynthesizer::new(&repo, &mapper);
        let tree = synth.synthesize(&node(2)).unwrap();

        let dir = tree.get("a").unwrap();
        assert_eq!(dir.kind, EntryKind::Directory);
        assert_eq!(dir.revision, local(&mapper, 2));
        assert_eq!(dir.file_id, mapper.file_id_for_path("a"));

        let file = tree.get("a/b.txt").unwrap();
        assert_eq!(file.kind, EntryKind::File);
        assert_eq!(file.revision, local(&mapper, 2));
        assert_eq!(file.text_size, 1);

        // top.txt is unchanged since revision 1.
        assert_eq!(tree.get("top.txt").unwrap().revision, local(&mapper, 1));
        // Root is present and attributed to the snapshot revision.
        assert_eq!(tree.get("").unwrap().revision, local(&mapper, 2));
    }

    #[test]
    fn test_executable_and_symlink_kinds() {
        let mut repo = MemFlatRepo::new();
        repo.commit(
            node(1),
            (NodeHash::NULL, NodeHash::NULL),
            "alice",
            "kinds",
            &[
                ("bin/run", Some((0o100755, b"#!".as_slice()))),
                ("link", Some((0o120000, b"target".as_slice()))),
            ],
        );

        let mapper = IdentityMapper::new();
        let synth = TreeSynthesizer::new(&repo, &mapper);
        let tree = synth.synthesize(&node(1)).unwrap();

        assert!(tree.get("bin/run").unwrap().executable);
        assert_eq!(tree.get("link").unwrap().kind, EntryKind::Symlink);
        assert!(!tree.get("link").unwrap().executable);
    }

    /// Build r1 <- {r2 adds `d/<a>`, r3 adds `d/<b>`} <- r4 (merge) and
    /// return the revision chosen for directory `d` at r4.
    fn tie_break_winner(file_of_r2: &str, file_of_r3: &str) -> RevisionId {
        let mut repo = MemFlatRepo::new();
        repo.commit(
            node(1),
            (NodeHash::NULL, NodeHash::NULL),
            "alice",
            "base",
            &[("base.txt", Some((MODE_FILE, b"base".as_slice())))],
        );
        repo.commit(
            node(2),
            (node(1), NodeHash::NULL),
            "bob",
            "left",
            &[(file_of_r2, Some((MODE_FILE, b"left".as_slice())))],
        );
        repo.commit(
            node(3),
            (node(1), NodeHash::NULL),
            "carol",
            "right",
            &[(file_of_r3, Some((MODE_FILE, b"right".as_slice())))],
        );
        // Merge manifest: r2's manifest plus r3's file.
        repo.commit(
            node(4),
            (node(2), node(3)),
            "dave",
            "merge",
            &[(file_of_r3, Some((MODE_FILE, b"right".as_slice())))],
        );

        let mapper = IdentityMapper::new();
        let synth = TreeSynthesizer::new(&repo, &mapper);
        let tree = synth.synthesize(&node(4)).unwrap();
        tree.get("d").unwrap().revision.clone()
    }

    #[test]
    fn test_sibling_tie_break_is_order_independent() {
        let mapper = IdentityMapper::new();
        // Neither r2 nor r3 is an ancestor of the other; the lesser id
        // must win whichever file the manifest iterates first.
        let expected = std::cmp::min(local(&mapper, 2), local(&mapper, 3));
        assert_eq!(tie_break_winner("d/x.txt", "d/y.txt"), expected);
        assert_eq!(tie_break_winner("d/y.txt", "d/x.txt"), expected);
    }

    #[test]
    fn test_modifying_revision_survives_untouched_revisions() {
        let mut repo = MemFlatRepo::new();
        repo.commit(
            node(1),
            (NodeHash::NULL, NodeHash::NULL),
            "alice",
            "add f",
            &[("f.txt", Some((MODE_FILE, b"v1".as_slice())))],
        );
        repo.commit(
            node(2),
            (node(1), NodeHash::NULL),
            "alice",
            "unrelated",
            &[("other.txt", Some((MODE_FILE, b"x".as_slice())))],
        );
        repo.commit(
            node(3),
            (node(2), NodeHash::NULL),
            "alice",
            "touch f",
            &[("f.txt", Some((MODE_FILE, b"v2".as_slice())))],
        );

        let mapper = IdentityMapper::new();
        let synth = TreeSynthesizer::new(&repo, &mapper);

        let tree = synth.synthesize(&node(2)).unwrap();
        assert_eq!(tree.get("f.txt").unwrap().revision, local(&mapper, 1));

        let tree = synth.synthesize(&node(3)).unwrap();
        assert_eq!(tree.get("f.txt").unwrap().revision, local(&mapper, 3));
    }

    #[test]
    fn test_merge_inherited_file_attributed_to_introducer() {
        let mut repo = MemFlatRepo::new();
        repo.commit(
            node(1),
            (NodeHash::NULL, NodeHash::NULL),
            "alice",
            "add f",
            &[("f.txt", Some((MODE_FILE, b"v1".as_slice())))],
        );
        repo.commit(
            node(2),
            (node(1), NodeHash::NULL),
            "bob",
            "left",
            &[("l.txt", Some((MODE_FILE, b"l".as_slice())))],
        );
        repo.commit(
            node(7),
            (node(1), NodeHash::NULL),
            "carol",
            "right",
            &[("r.txt", Some((MODE_FILE, b"r".as_slice())))],
        );
        repo.commit(
            node(10),
            (node(2), node(7)),
            "dave",
            "merge",
            &[("r.txt", Some((MODE_FILE, b"r".as_slice())))],
        );

        let mapper = IdentityMapper::new();
        let synth = TreeSynthesizer::new(&repo, &mapper);
        let tree = synth.synthesize(&node(10)).unwrap();
        // f.txt reaches the merge untouched through both sides.
        assert_eq!(tree.get("f.txt").unwrap().revision, local(&mapper, 1));
    }

    #[test]
    fn test_malformed_mode_is_fatal() {
        let mut repo = MemFlatRepo::new();
        repo.commit(
            node(1),
            (NodeHash::NULL, NodeHash::NULL),
            "alice",
            "bad mode",
            &[("weird", Some((0o777777, b"?".as_slice())))],
        );

        let mapper = IdentityMapper::new();
        let synth = TreeSynthesizer::new(&repo, &mapper);
        let err = synth.synthesize(&node(1)).unwrap_err();
        assert!(matches!(
            err,
            SynthesisError::MalformedManifestEntry { ref path, .. } if path == "weird"
        ));
    }

    #[test]
    fn test_synthesis_is_idempotent() {
        let mut repo = MemFlatRepo::new();
        repo.commit(
            node(1),
            (NodeHash::NULL, NodeHash::NULL),
            "alice",
            "base",
            &[("a/b/c.txt", Some((MODE_FILE, b"deep".as_slice())))],
        );
        repo.commit(
            node(2),
            (node(1), NodeHash::NULL),
            "alice",
            "more",
            &[("a/d.txt", Some((MODE_FILE, b"d".as_slice())))],
        );

        let mapper = IdentityMapper::new();
        let first = TreeSynthesizer::new(&repo, &mapper)
            .synthesize(&node(2))
            .unwrap();
        let second = TreeSynthesizer::new(&repo, &mapper)
            .synthesize(&node(2))
            .unwrap();
        assert_eq!(first, second);
        // Directory chain is complete: a and a/b both synthesized.
        assert!(first.contains_path("a"));
        assert!(first.contains_path("a/b"));
    }
}
