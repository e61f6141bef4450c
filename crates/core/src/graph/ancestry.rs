//! Memoized ancestry queries over a partially-known revision graph.
//!
//! The graph is never assumed complete: unknown nodes are resolved on
//! demand through a [`ParentSource`] and cached. Ancestry sets are
//! memoized per start revision, so repeated `is_ancestor_or_equal` calls
//! during one discovery or synthesis operation never recompute a set.
//! All caches are scoped to the index's lifetime; the index itself is
//! scoped to one operation and safe to rebuild.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::rc::Rc;

use crate::errors::GraphError;
use crate::models::RevisionId;

/// External "get parents of id" collaborator backing graph expansion.
pub trait ParentSource {
    /// Parents of `id`, sentinel parents omitted. An id unknown to the
    /// source is an [`GraphError::AncestryInconsistency`].
    fn parents(&self, id: &RevisionId) -> Result<Vec<RevisionId>, GraphError>;
}

/// A fully materialized revision graph used as a [`ParentSource`].
pub struct MaterializedGraph<'g>(pub &'g HashMap<RevisionId, Vec<RevisionId>>);

impl ParentSource for MaterializedGraph<'_> {
    fn parents(&self, id: &RevisionId) -> Result<Vec<RevisionId>, GraphError> {
        self.0
            .get(id)
            .cloned()
            .ok_or_else(|| GraphError::AncestryInconsistency(id.clone()))
    }
}

/// Lazily expanded, memoized transitive-closure index.
pub struct AncestryIndex<'a> {
    source: &'a dyn ParentSource,
    /// Expanding graph cache. A node appears here only once its parents
    /// are known; unresolved nodes stay on the expansion frontier.
    graph: RefCell<HashMap<RevisionId, Vec<RevisionId>>>,
    /// Full reachable set per queried start revision.
    ancestry: RefCell<HashMap<RevisionId, Rc<HashSet<RevisionId>>>>,
}

impl<'a> AncestryIndex<'a> {
    pub fn new(source: &'a dyn ParentSource) -> Self {
        Self {
            source,
            graph: RefCell::new(HashMap::new()),
            ancestry: RefCell::new(HashMap::new()),
        }
    }

    fn parents_of(&self, id: &RevisionId) -> Result<Vec<RevisionId>, GraphError> {
        if id.is_null() {
            return Ok(Vec::new());
        }
        if let Some(parents) = self.graph.borrow().get(id) {
            return Ok(parents.clone());
        }
        let parents = self.source.parents(id)?;
        self.graph.borrow_mut().insert(id.clone(), parents.clone());
        Ok(parents)
    }

    /// The full set reachable from `start` (including `start` itself),
    /// expanded breadth-first. Each node is visited at most once; results
    /// are memoized per start revision.
    pub fn compute_ancestry_set(
        &self,
        start: &RevisionId,
    ) -> Result<Rc<HashSet<RevisionId>>, GraphError> {
        if let Some(set) = self.ancestry.borrow().get(start) {
            return Ok(Rc::clone(set));
        }
        let mut ancestry = HashSet::new();
        let mut pending = BTreeSet::new();
        pending.insert(start.clone());
        while let Some(node) = pending.pop_first() {
            ancestry.insert(node.clone());
            for parent in self.parents_of(&node)? {
                if !ancestry.contains(&parent) {
                    pending.insert(parent);
                }
            }
        }
        let set = Rc::new(ancestry);
        self.ancestry
            .borrow_mut()
            .insert(start.clone(), Rc::clone(&set));
        Ok(set)
    }

    /// Whether `a` is `b` itself or one of its transitive parents.
    pub fn is_ancestor_or_equal(
        &self,
        a: &RevisionId,
        b: &RevisionId,
    ) -> Result<bool, GraphError> {
        Ok(self.compute_ancestry_set(b)?.contains(a))
    }
}
