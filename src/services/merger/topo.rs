//! C6.1 — Topological sort of epics with lexicographic tie-breaking.
//!
//! Grounded in `dependency_resolver.rs`'s `topological_sort` (Kahn's
//! algorithm over an in-degree map), swapped from an arbitrary-pop queue to
//! a `BinaryHeap<Reverse<_>>` so the smallest-id-first tie-break spec.md
//! §4.6.1 requires is deterministic rather than incidental.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::domain::error::MergeError;
use crate::domain::models::Epic;

/// Sort epics into a dependency-respecting order. Unknown epic ids named in
/// `dependencies_on_epics` are ignored (they do not raise in-degree). A
/// self-dependency always produces a cycle, since it contributes an
/// in-degree the epic itself can never clear.
pub fn topological_sort_epics(epics: &[Epic]) -> Result<Vec<String>, MergeError> {
    let known: HashSet<&str> = epics.iter().map(|e| e.id.as_str()).collect();

    let mut in_degree: HashMap<&str, u32> = epics.iter().map(|e| (e.id.as_str(), 0)).collect();
    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();

    for epic in epics {
        for dep in &epic.dependencies_on_epics {
            if known.contains(dep.as_str()) {
                *in_degree.get_mut(epic.id.as_str()).unwrap() += 1;
                successors.entry(dep.as_str()).or_default().push(epic.id.as_str());
            }
        }
    }

    let mut remaining = in_degree.clone();
    let mut heap: BinaryHeap<Reverse<&str>> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| Reverse(*id))
        .collect();

    let mut order = Vec::with_capacity(epics.len());
    while let Some(Reverse(id)) = heap.pop() {
        order.push(id.to_string());
        if let Some(succs) = successors.get(id) {
            for succ in succs {
                let degree = remaining.get_mut(succ).unwrap();
                *degree -= 1;
                if *degree == 0 {
                    heap.push(Reverse(*succ));
                }
            }
        }
    }

    if order.len() != epics.len() {
        let sorted: HashSet<&str> = order.iter().map(String::as_str).collect();
        let mut unsorted: Vec<String> = epics
            .iter()
            .map(|e| e.id.clone())
            .filter(|id| !sorted.contains(id.as_str()))
            .collect();
        unsorted.sort();
        return Err(MergeError::CyclicEpicDependency(unsorted));
    }

    Ok(order)
}
