//! Missing-revision discovery.
//!
//! Determines, without transferring full history, exactly which
//! flat-system revisions reachable from a set of requested heads are
//! unknown to the tree-system target. Two phases: branch-segment
//! expansion over the source's segment shapes, then binary-search
//! narrowing of segments whose root is already known locally.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use tracing::debug;

use crate::errors::GraphError;
use crate::mapping::IdentityMapper;
use crate::models::{BranchSegment, NodeHash};
use crate::repo::{FlatRepo, TreeRepo};

/// Default number of parent ids looked up per `branches` request.
/// A performance policy, not a correctness requirement.
pub const DEFAULT_BRANCH_BATCH_SIZE: usize = 10;

/// Frontier discovery engine over one source/target pair.
///
/// The local-knowledge memo is scoped to one engine, i.e. one discovery
/// operation; build a fresh engine per call.
pub struct GraphDiffEngine<'a, S: FlatRepo + ?Sized, T: TreeRepo + ?Sized> {
    source: &'a S,
    target: &'a T,
    mapper: &'a IdentityMapper,
    batch_size: usize,
    known: RefCell<HashMap<NodeHash, bool>>,
}

impl<'a, S: FlatRepo + ?Sized, T: TreeRepo + ?Sized> GraphDiffEngine<'a, S, T> {
    pub fn new(source: &'a S, target: &'a T, mapper: &'a IdentityMapper) -> Self {
        Self {
            source,
            target,
            mapper,
            batch_size: DEFAULT_BRANCH_BATCH_SIZE,
            known: RefCell::new(HashMap::new()),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Whether the target already knows this flat-system revision.
    /// The sentinel counts as known everywhere.
    fn known_locally(&self, node: &NodeHash) -> Result<bool, GraphError> {
        if node.is_null() {
            return Ok(true);
        }
        if let Some(known) = self.known.borrow().get(node) {
            return Ok(*known);
        }
        let id = self.mapper.revision_to_local(node);
        let known = !self.target.has_revisions(&[id.clone()])?.is_empty();
        self.known.borrow_mut().insert(*node, known);
        Ok(known)
    }

    /// Find the minimal frontier of source revisions the target must
    /// fetch to cover `heads`.
    ///
    /// A returned revision is directly fetchable: both of its parents are
    /// already present in the target, or it was isolated as the boundary
    /// of a narrowed branch segment. The ancestor-closure of the frontier
    /// is the caller's concern once a topological fetch order is computed.
    pub fn find_missing(&self, heads: &[NodeHash]) -> Result<BTreeSet<NodeHash>, GraphError> {
        let mut unknown_heads = Vec::new();
        for head in heads {
            if !self.known_locally(head)? {
                unknown_heads.push(*head);
            }
        }
        let mut fetch = BTreeSet::new();
        if unknown_heads.is_empty() {
            debug!("all requested heads already known locally");
            return Ok(fetch);
        }

        // Phase 1: expand branch segments from the unknown heads.
        let mut seen: HashSet<NodeHash> = HashSet::new();
        let mut seen_branch: HashSet<BranchSegment> = HashSet::new();
        let mut requested: HashSet<NodeHash> = unknown_heads.iter().copied().collect();
        let mut search: Vec<(NodeHash, NodeHash)> = Vec::new();

        let mut worklist: VecDeque<BranchSegment> =
            self.source.branches(&unknown_heads)?.into();
        while !worklist.is_empty() {
            let mut pending_parents: Vec<NodeHash> = Vec::new();
            while let Some(segment) = worklist.pop_front() {
                if seen.contains(&segment.head) {
                    continue;
                }
                debug!(head = %segment.head, root = %segment.root, "examining branch segment");
                if segment.head.is_null() {
                    // reached the start of history on this branch
                } else if seen_branch.contains(&segment) {
                    debug!("branch already found");
                    continue;
                } else if self.known_locally(&segment.root)? {
                    // Complete but unscanned: the boundary lies somewhere
                    // inside the segment. Narrow it in phase 2.
                    debug!(head = %segment.head, root = %segment.root, "found incomplete branch");
                    search.push((segment.head, segment.root));
                    seen_branch.insert(segment);
                } else {
                    if !seen.contains(&segment.root) && !fetch.contains(&segment.root) {
                        if self.known_locally(&segment.parent1)?
                            && self.known_locally(&segment.parent2)?
                        {
                            debug!(root = %segment.root, "found new changeset");
                            fetch.insert(segment.root);
                        }
                    }
                    for parent in [segment.parent1, segment.parent2] {
                        if !requested.contains(&parent) && !self.known_locally(&parent)? {
                            pending_parents.push(parent);
                            requested.insert(parent);
                        }
                    }
                }
                seen.insert(segment.head);
            }

            for chunk in pending_parents.chunks(self.batch_size) {
                for segment in self.source.branches(chunk)? {
                    debug!(head = %segment.head, root = %segment.root, "received branch segment");
                    worklist.push_back(segment);
                }
            }
        }

        // Phase 2: binary search over complete-but-unscanned segments.
        while !search.is_empty() {
            let mut narrowed = Vec::new();
            let probe_lists = self.source.between(&search)?;
            for ((head, root), mut probes) in search.iter().zip(probe_lists) {
                probes.push(*root);
                let mut boundary = *head;
                let mut stride: u64 = 1;
                for probe in probes {
                    debug!(stride, probe = %probe, "narrowing branch search");
                    if self.known_locally(&probe)? {
                        if stride <= 2 {
                            debug!(boundary = %boundary, "found new branch changeset");
                            fetch.insert(boundary);
                        } else {
                            debug!(head = %boundary, root = %probe, "narrowed branch search");
                            narrowed.push((boundary, probe));
                        }
                        break;
                    }
                    boundary = probe;
                    stride *= 2;
                }
            }
            search = narrowed;
        }

        Ok(fetch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::memory::{MemFlatRepo, MemTreeRepo};
    use crate::models::RevisionMetadata;
    use crate::tree::TreeSnapshot;

    fn node(n: u8) -> NodeHash {
        NodeHash::from_array([n; 20])
    }

    fn seed_target(target: &mut MemTreeRepo, mapper: &IdentityMapper, nodes: &[NodeHash]) {
        target.start_write_group().unwrap();
        for n in nodes {
            let id = mapper.revision_to_local(n);
            let meta = RevisionMetadata {
                id: id.clone(),
                parent_ids: vec![],
                committer: "alice".into(),
                message: "seed".into(),
                timestamp: 0,
                tz_offset_secs: 0,
            };
            target.add_revision(meta, TreeSnapshot::new(id)).unwrap();
        }
        target.commit_write_group().unwrap();
    }

    /// n1 <- n2 <- n4 (merge of n2, n3) <- n5, with n3 also off n1.
    fn merge_repo() -> MemFlatRepo {
        let mut repo = MemFlatRepo::new();
        repo.commit(node(1), (NodeHash::NULL, NodeHash::NULL), "a", "1", &[]);
        repo.commit(node(2), (node(1), NodeHash::NULL), "a", "2", &[]);
        repo.commit(node(3), (node(1), NodeHash::NULL), "a", "3", &[]);
        repo.commit(node(4), (node(2), node(3)), "a", "merge", &[]);
        repo.commit(node(5), (node(4), NodeHash::NULL), "a", "5", &[]);
        repo
    }

    #[test]
    fn test_known_heads_yield_empty_frontier() {
        let source = merge_repo();
        let mut target = MemTreeRepo::new();
        let mapper = IdentityMapper::default();
        seed_target(&mut target, &mapper, &[node(1), node(2), node(3), node(4), node(5)]);

        let engine = GraphDiffEngine::new(&source, &target, &mapper);
        let fetch = engine.find_missing(&[node(5)]).unwrap();
        assert!(fetch.is_empty());
        assert_eq!(source.branches_calls.get(), 0, "no source traffic expected");
    }

    #[test]
    fn test_empty_target_frontier_is_history_root() {
        let source = merge_repo();
        let target = MemTreeRepo::new();
        let mapper = IdentityMapper::default();

        let engine = GraphDiffEngine::new(&source, &target, &mapper);
        let fetch = engine.find_missing(&[node(5)]).unwrap();
        assert_eq!(fetch.into_iter().collect::<Vec<_>>(), vec![node(1)]);
    }

    #[test]
    fn test_partially_known_merge_isolates_missing_branch() {
        let source = merge_repo();
        let mut target = MemTreeRepo::new();
        let mapper = IdentityMapper::default();
        seed_target(&mut target, &mapper, &[node(1), node(2)]);

        let engine = GraphDiffEngine::new(&source, &target, &mapper);
        let fetch = engine.find_missing(&[node(5)]).unwrap();
        // n3 is the only revision whose parents are all present.
        assert_eq!(fetch.into_iter().collect::<Vec<_>>(), vec![node(3)]);
    }

    #[test]
    fn test_narrowing_long_chain_costs_log_rounds() {
        let mut source = MemFlatRepo::new();
        for i in 1..=64u8 {
            let parent = if i == 1 { NodeHash::NULL } else { node(i - 1) };
            source.commit(node(i), (parent, NodeHash::NULL), "a", "c", &[]);
        }
        let mut target = MemTreeRepo::new();
        let mapper = IdentityMapper::default();
        seed_target(&mut target, &mapper, &[node(1)]);

        let engine = GraphDiffEngine::new(&source, &target, &mapper);
        let fetch = engine.find_missing(&[node(64)]).unwrap();
        assert_eq!(fetch.into_iter().collect::<Vec<_>>(), vec![node(2)]);
        assert!(
            source.between_calls.get() <= 8,
            "expected logarithmic narrowing, got {} rounds",
            source.between_calls.get()
        );
    }
}
