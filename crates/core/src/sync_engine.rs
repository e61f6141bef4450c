//! Fetch orchestration: discovery, ordering, synthesis, transfer.
//!
//! One [`SyncEngine::fetch`] call is one transaction against the target:
//! every revision the discovery frontier implies is copied inside a
//! single write group, in topological order, or none of them are.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::Utc;
use tracing::{debug, info};

use crate::errors::{GraphError, SourceError, SyncError};
use crate::graph::{topo_sort, GraphDiffEngine, DEFAULT_BRANCH_BATCH_SIZE};
use crate::mapping::IdentityMapper;
use crate::models::{EntryKind, FetchStats, Manifest, NodeHash, RevisionId, RevisionMetadata};
use crate::repo::{FlatRepo, TreeRepo};
use crate::tree::TreeSynthesizer;

/// What a fetch should cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchSpec {
    /// Everything reachable from the source's current heads.
    AllHeads,
    /// One revision and its ancestry.
    Revision(RevisionId),
    /// A caller-chosen set of heads and their ancestry.
    Heads(Vec<RevisionId>),
}

/// Copies flat-system history into a tree-system target.
pub struct SyncEngine<'a, S: FlatRepo + ?Sized, T: TreeRepo + ?Sized> {
    source: &'a S,
    target: &'a mut T,
    mapper: &'a IdentityMapper,
    batch_size: usize,
}

impl<'a, S: FlatRepo + ?Sized, T: TreeRepo + ?Sized> SyncEngine<'a, S, T> {
    pub fn new(source: &'a S, target: &'a mut T, mapper: &'a IdentityMapper) -> Self {
        Self {
            source,
            target,
            mapper,
            batch_size: DEFAULT_BRANCH_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Run one fetch. On any error the write group is aborted and the
    /// target is left exactly as it was.
    pub fn fetch(&mut self, spec: &FetchSpec) -> Result<FetchStats, SyncError> {
        let started_at = Utc::now().to_rfc3339();
        let heads = self.resolve_heads(spec)?;
        debug!(heads = heads.len(), "starting fetch");

        let frontier = {
            let engine = GraphDiffEngine::new(self.source, &*self.target, self.mapper)
                .with_batch_size(self.batch_size);
            engine.find_missing(&heads)?
        };
        let mut stats = FetchStats {
            frontier_size: frontier.len(),
            revisions_fetched: 0,
            texts_copied: 0,
            started_at,
            completed_at: None,
        };
        if frontier.is_empty() {
            info!("target already covers the requested heads");
            stats.completed_at = Some(Utc::now().to_rfc3339());
            return Ok(stats);
        }

        let order = self.missing_in_topological_order(&heads)?;
        info!(revisions = order.len(), frontier = stats.frontier_size, "copying revisions");

        self.target.start_write_group().map_err(SyncError::from)?;
        match self.copy_revisions(&order, &mut stats) {
            Ok(()) => {
                self.target.commit_write_group().map_err(SyncError::from)?;
            }
            Err(err) => {
                self.target.abort_write_group().map_err(SyncError::from)?;
                return Err(err);
            }
        }

        stats.completed_at = Some(Utc::now().to_rfc3339());
        info!(
            revisions = stats.revisions_fetched,
            texts = stats.texts_copied,
            "fetch complete"
        );
        Ok(stats)
    }

    fn resolve_heads(&self, spec: &FetchSpec) -> Result<Vec<NodeHash>, SyncError> {
        let requested: Vec<RevisionId> = match spec {
            FetchSpec::AllHeads => {
                return Ok(self.source.heads().map_err(SyncError::from)?);
            }
            FetchSpec::Revision(id) => vec![id.clone()],
            FetchSpec::Heads(ids) => ids.clone(),
        };
        let mut heads = Vec::with_capacity(requested.len());
        for id in &requested {
            let (node, _) = self.mapper.revision_local_to_foreign(id)?;
            if !node.is_null() {
                heads.push(node);
            }
        }
        Ok(heads)
    }

    /// All source revisions reachable from `heads` that the target lacks,
    /// parents before children.
    fn missing_in_topological_order(
        &self,
        heads: &[NodeHash],
    ) -> Result<Vec<NodeHash>, SyncError> {
        let mut known: HashMap<NodeHash, bool> = HashMap::new();
        let mut graph: HashMap<RevisionId, Vec<RevisionId>> = HashMap::new();
        let mut by_id: HashMap<RevisionId, NodeHash> = HashMap::new();

        let mut queue: VecDeque<NodeHash> = heads.iter().copied().collect();
        let mut visited: HashSet<NodeHash> = queue.iter().copied().collect();
        while let Some(node) = queue.pop_front() {
            if node.is_null() || self.target_knows(&mut known, &node)? {
                continue;
            }
            // A revision reachable through parent pointers but absent from
            // both repositories means the graphs disagree; abort before any
            // write group is opened.
            let (p1, p2) = match self.source.parents(&node) {
                Ok(parents) => parents,
                Err(SourceError::RevisionNotFound(_)) => {
                    return Err(GraphError::AncestryInconsistency(
                        self.mapper.revision_to_local(&node),
                    )
                    .into());
                }
                Err(err) => return Err(err.into()),
            };
            let id = self.mapper.revision_to_local(&node);
            let parent_ids = [p1, p2]
                .into_iter()
                .filter(|p| !p.is_null())
                .map(|p| self.mapper.revision_to_local(&p))
                .collect();
            by_id.insert(id.clone(), node);
            graph.insert(id, parent_ids);
            for parent in [p1, p2] {
                if visited.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }

        // Parents already in the target are outside `graph` and sort as
        // satisfied dependencies.
        let order = topo_sort(&graph)?;
        Ok(order
            .into_iter()
            .filter_map(|id| by_id.get(&id).copied())
            .collect())
    }

    fn target_knows(
        &self,
        memo: &mut HashMap<NodeHash, bool>,
        node: &NodeHash,
    ) -> Result<bool, SyncError> {
        if let Some(known) = memo.get(node) {
            return Ok(*known);
        }
        let id = self.mapper.revision_to_local(node);
        let known = !self.target.has_revisions(&[id])?.is_empty();
        memo.insert(*node, known);
        Ok(known)
    }

    fn copy_revisions(
        &mut self,
        order: &[NodeHash],
        stats: &mut FetchStats,
    ) -> Result<(), SyncError> {
        let source = self.source;
        let mapper = self.mapper;
        let synthesizer = TreeSynthesizer::new(source, mapper);
        let mut manifests: HashMap<NodeHash, Manifest> = HashMap::new();

        for node in order {
            let entry = source.changelog_entry(node).map_err(SyncError::from)?;
            let (p1, p2) = source.parents(node).map_err(SyncError::from)?;
            let id = mapper.revision_to_local(node);
            let parent_pairs: Vec<(NodeHash, RevisionId)> = [p1, p2]
                .into_iter()
                .filter(|p| !p.is_null())
                .map(|p| (p, mapper.revision_to_local(&p)))
                .collect();
            let parent_ids: Vec<RevisionId> =
                parent_pairs.iter().map(|(_, id)| id.clone()).collect();
            debug!(revision = %id, "copying revision");

            let tree = synthesizer.synthesize(node)?;
            let manifest = manifest_for(source, &mut manifests, node)?.clone();
            for (path, tree_entry) in tree.iter() {
                // Only texts introduced by this very revision need copying;
                // everything else is already in the target's file graph.
                if tree_entry.kind == EntryKind::Directory || tree_entry.revision != id {
                    continue;
                }
                let Some(manifest_entry) = manifest.get(path) else {
                    continue;
                };
                let text = source
                    .file_text(path, &manifest_entry.node)
                    .map_err(SyncError::from)?;
                let mut text_parents = Vec::new();
                for (parent_node, parent_id) in &parent_pairs {
                    let parent_manifest = manifest_for(source, &mut manifests, parent_node)?;
                    if parent_manifest.contains_path(path) {
                        text_parents.push(parent_id.clone());
                    }
                }
                self.target
                    .insert_file_text(&tree_entry.file_id, &id, &text_parents, &text)
                    .map_err(SyncError::from)?;
                stats.texts_copied += 1;
            }

            let meta = RevisionMetadata {
                id: id.clone(),
                parent_ids,
                committer: entry.committer,
                message: entry.message,
                timestamp: entry.timestamp,
                // Changelog offsets count west of UTC, tree metadata east.
                tz_offset_secs: -entry.tz_offset_secs,
            };
            self.target.add_revision(meta, tree).map_err(SyncError::from)?;
            stats.revisions_fetched += 1;
        }
        Ok(())
    }
}

fn manifest_for<'m, S: FlatRepo + ?Sized>(
    source: &S,
    cache: &'m mut HashMap<NodeHash, Manifest>,
    node: &NodeHash,
) -> Result<&'m Manifest, SourceError> {
    if !cache.contains_key(node) {
        let manifest = if node.is_null() {
            Manifest::new()
        } else {
            source.manifest(node)?
        };
        cache.insert(*node, manifest);
    }
    Ok(&cache[node])
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::memory::{MemFlatRepo, MemTreeRepo};

    fn node(n: u8) -> NodeHash {
        NodeHash::from_array([n; 20])
    }

    fn small_repo() -> MemFlatRepo {
        let mut repo = MemFlatRepo::new();
        repo.commit(
            node(1),
            (NodeHash::NULL, NodeHash::NULL),
            "alice",
            "add a",
            &[("a.txt", Some((0o100644, b"one".as_slice())))],
        );
        repo.commit(
            node(2),
            (node(1), NodeHash::NULL),
            "bob",
            "add b",
            &[("dir/b.txt", Some((0o100644, b"two".as_slice())))],
        );
        repo
    }

    #[test]
    fn test_fetch_all_heads_copies_in_order() {
        let source = small_repo();
        let mut target = MemTreeRepo::new();
        let mapper = IdentityMapper::default();

        let stats = SyncEngine::new(&source, &mut target, &mapper)
            .fetch(&FetchSpec::AllHeads)
            .unwrap();
        assert_eq!(stats.revisions_fetched, 2);
        assert_eq!(target.len(), 2);

        let head = mapper.revision_to_local(&node(2));
        let meta = target.get_revision(&head).unwrap().unwrap();
        assert_eq!(meta.committer, "bob");
        assert_eq!(meta.parent_ids, vec![mapper.revision_to_local(&node(1))]);

        let tree = target.tree(&head).unwrap();
        assert!(tree.contains_path("a.txt"));
        assert!(tree.contains_path("dir"));
        assert!(tree.contains_path("dir/b.txt"));
    }

    #[test]
    fn test_fetch_is_idempotent() {
        let source = small_repo();
        let mut target = MemTreeRepo::new();
        let mapper = IdentityMapper::default();

        SyncEngine::new(&source, &mut target, &mapper)
            .fetch(&FetchSpec::AllHeads)
            .unwrap();
        let stats = SyncEngine::new(&source, &mut target, &mapper)
            .fetch(&FetchSpec::AllHeads)
            .unwrap();
        assert_eq!(stats.frontier_size, 0);
        assert_eq!(stats.revisions_fetched, 0);
        assert_eq!(target.len(), 2);
    }

    #[test]
    fn test_timezone_sign_is_flipped() {
        let mut source = MemFlatRepo::new();
        source.commit(node(1), (NodeHash::NULL, NodeHash::NULL), "a", "m", &[]);
        // 5 hours west of UTC in the changelog.
        if let Some(entry) = source_entry_mut(&mut source) {
            entry.tz_offset_secs = 5 * 3600;
        }
        let mut target = MemTreeRepo::new();
        let mapper = IdentityMapper::default();
        SyncEngine::new(&source, &mut target, &mapper)
            .fetch(&FetchSpec::AllHeads)
            .unwrap();

        let meta = target
            .get_revision(&mapper.revision_to_local(&node(1)))
            .unwrap()
            .unwrap();
        assert_eq!(meta.tz_offset_secs, -5 * 3600);
    }

    fn source_entry_mut(source: &mut MemFlatRepo) -> Option<&mut crate::models::ChangelogEntry> {
        source.entry_mut(&NodeHash::from_array([1; 20]))
    }

    /// A source with truncated history: its branch segments name a parent
    /// revision it can no longer resolve.
    struct TruncatedSource;

    impl FlatRepo for TruncatedSource {
        fn heads(&self) -> Result<Vec<NodeHash>, SourceError> {
            Ok(vec![node(2)])
        }

        fn branches(
            &self,
            nodes: &[NodeHash],
        ) -> Result<Vec<crate::models::BranchSegment>, SourceError> {
            Ok(nodes
                .iter()
                .map(|n| crate::models::BranchSegment {
                    head: *n,
                    root: *n,
                    parent1: if *n == node(2) { node(1) } else { NodeHash::NULL },
                    parent2: NodeHash::NULL,
                })
                .collect())
        }

        fn between(
            &self,
            spans: &[(NodeHash, NodeHash)],
        ) -> Result<Vec<Vec<NodeHash>>, SourceError> {
            Ok(vec![Vec::new(); spans.len()])
        }

        fn parents(&self, n: &NodeHash) -> Result<(NodeHash, NodeHash), SourceError> {
            if *n == node(2) {
                Ok((node(1), NodeHash::NULL))
            } else {
                Err(SourceError::RevisionNotFound(*n))
            }
        }

        fn known(&self, nodes: &[NodeHash]) -> Result<HashSet<NodeHash>, SourceError> {
            Ok(nodes.iter().filter(|n| **n == node(2)).copied().collect())
        }

        fn changelog_entry(
            &self,
            n: &NodeHash,
        ) -> Result<crate::models::ChangelogEntry, SourceError> {
            Err(SourceError::RevisionNotFound(*n))
        }

        fn manifest(&self, n: &NodeHash) -> Result<Manifest, SourceError> {
            Err(SourceError::RevisionNotFound(*n))
        }

        fn file_size(&self, path: &str, file_node: &NodeHash) -> Result<u64, SourceError> {
            Err(SourceError::FileNotFound {
                path: path.to_string(),
                node: *file_node,
            })
        }

        fn file_text(&self, path: &str, file_node: &NodeHash) -> Result<Vec<u8>, SourceError> {
            Err(SourceError::FileNotFound {
                path: path.to_string(),
                node: *file_node,
            })
        }
    }

    #[test]
    fn test_parent_absent_everywhere_is_ancestry_inconsistency() {
        let source = TruncatedSource;
        let mut target = MemTreeRepo::new();
        let mapper = IdentityMapper::default();

        let err = SyncEngine::new(&source, &mut target, &mapper)
            .fetch(&FetchSpec::AllHeads)
            .unwrap_err();
        match err {
            SyncError::Graph(GraphError::AncestryInconsistency(id)) => {
                assert_eq!(id, mapper.revision_to_local(&node(1)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(target.is_empty(), "nothing may be staged or committed");
    }
}
