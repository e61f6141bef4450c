//! Deterministic topological ordering of a revision graph.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::errors::GraphError;
use crate::models::RevisionId;

/// Order a materialized graph parents-first.
///
/// Only parents present in the graph constrain the order; edges to
/// revisions outside the graph (already-known history) are ignored. Among
/// unconstrained revisions the total order of [`RevisionId`] decides, so
/// the output is stable across runs.
pub fn topo_sort(
    graph: &HashMap<RevisionId, Vec<RevisionId>>,
) -> Result<Vec<RevisionId>, GraphError> {
    let mut in_degree: BTreeMap<&RevisionId, usize> = BTreeMap::new();
    let mut children: BTreeMap<&RevisionId, Vec<&RevisionId>> = BTreeMap::new();

    for (node, parents) in graph {
        let degree = parents.iter().filter(|p| graph.contains_key(*p)).count();
        in_degree.insert(node, degree);
        for parent in parents {
            if graph.contains_key(parent) {
                children.entry(parent).or_default().push(node);
            }
        }
    }

    let mut ready: BTreeSet<&RevisionId> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(n, _)| *n)
        .collect();

    let mut order = Vec::with_capacity(graph.len());
    while let Some(node) = ready.pop_first() {
        order.push(node.clone());
        for &child in children.get(node).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(child) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(child);
                }
            }
        }
    }

    if order.len() != graph.len() {
        return Err(GraphError::Cycle {
            remaining: graph.len() - order.len(),
        });
    }
    Ok(order)
}
