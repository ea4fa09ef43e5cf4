//! C7 — DAG Validator + Phase Assigner.
//!
//! Cycle detection is grounded in `dependency_resolver.rs`'s
//! `detect_cycle_util` (visited/rec-stack/path DFS, truncating the path to
//! the cycle on hit) and `dag_builder.rs`'s reachability-before-mutate
//! idiom; depth computation mirrors `calculate_depth_recursive`'s
//! memoized max-over-deps recursion, generalized from `Uuid` node ids to
//! global-id strings.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::domain::error::DagError;
use crate::domain::models::{MergedTask, PhaseInfo};

fn detect_cycle(tasks: &[MergedTask]) -> Result<(), DagError> {
    let adjacency: HashMap<&str, &[String]> =
        tasks.iter().map(|t| (t.global_id.as_str(), t.dependencies.as_slice())).collect();

    let mut visited: HashSet<&str> = HashSet::new();
    let mut rec_stack: HashSet<&str> = HashSet::new();

    fn visit<'a>(
        node: &'a str,
        adjacency: &HashMap<&'a str, &'a [String]>,
        visited: &mut HashSet<&'a str>,
        rec_stack: &mut HashSet<&'a str>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        if rec_stack.contains(node) {
            let start = path.iter().position(|n| *n == node).unwrap_or(0);
            return Some(path[start..].iter().map(|s| s.to_string()).collect());
        }
        if visited.contains(node) {
            return None;
        }
        visited.insert(node);
        rec_stack.insert(node);
        path.push(node);

        if let Some(deps) = adjacency.get(node) {
            for dep in deps.iter() {
                if let Some(cycle) = visit(dep, adjacency, visited, rec_stack, path) {
                    return Some(cycle);
                }
            }
        }

        path.pop();
        rec_stack.remove(node);
        None
    }

    for id in adjacency.keys() {
        if !visited.contains(id) {
            let mut path = Vec::new();
            if let Some(cycle) = visit(id, &adjacency, &mut visited, &mut rec_stack, &mut path) {
                return Err(DagError::Cycle(cycle));
            }
        }
    }

    Ok(())
}

/// Compute `depth(t) = 0` when `t` has no dependencies, else
/// `1 + max(depth(d) for d in deps)`. Assumes the graph is acyclic — call
/// after [`detect_cycle`] succeeds.
pub fn compute_depths(tasks: &[MergedTask]) -> HashMap<String, u32> {
    let by_id: HashMap<&str, &MergedTask> = tasks.iter().map(|t| (t.global_id.as_str(), t)).collect();
    let mut memo: HashMap<String, u32> = HashMap::new();

    fn depth_of<'a>(id: &'a str, by_id: &HashMap<&'a str, &'a MergedTask>, memo: &mut HashMap<String, u32>) -> u32 {
        if let Some(d) = memo.get(id) {
            return *d;
        }
        let Some(task) = by_id.get(id) else {
            return 0;
        };
        let depth = if task.dependencies.is_empty() {
            0
        } else {
            1 + task.dependencies.iter().map(|d| depth_of(d, by_id, memo)).max().unwrap_or(0)
        };
        memo.insert(id.to_string(), depth);
        depth
    }

    for task in tasks {
        depth_of(&task.global_id, &by_id, &mut memo);
    }
    memo
}

/// Group tasks into phases by equal depth. An empty `depths` map is treated
/// as "all depth 0", yielding a single phase. Phase name is the title of
/// the epic contributing the most tasks to that phase, tied lexicographically
/// by epic title; falls back to `Phase N` when no epic titles are supplied
/// or the winning epic id is unknown.
pub fn assign_phases(
    tasks: &[MergedTask],
    depths: &HashMap<String, u32>,
    epic_titles: &HashMap<String, String>,
) -> Vec<PhaseInfo> {
    let mut by_depth: BTreeMap<u32, Vec<MergedTask>> = BTreeMap::new();
    for task in tasks {
        let depth = depths.get(&task.global_id).copied().unwrap_or(0);
        by_depth.entry(depth).or_default().push(task.clone());
    }

    let mut phases = Vec::with_capacity(by_depth.len());
    for (depth, mut group) in by_depth {
        group.sort_by(|a, b| a.global_id.cmp(&b.global_id));

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for task in &group {
            *counts.entry(task.epic_id.as_str()).or_insert(0) += 1;
        }
        let mut candidates: Vec<(&str, usize)> = counts.into_iter().collect();
        candidates.sort_by(|a, b| {
            b.1.cmp(&a.1).then_with(|| {
                let title_a = epic_titles.get(a.0).map(String::as_str).unwrap_or("");
                let title_b = epic_titles.get(b.0).map(String::as_str).unwrap_or("");
                title_a.cmp(title_b)
            })
        });
        let name = candidates
            .first()
            .and_then(|(epic_id, _)| epic_titles.get(*epic_id).cloned())
            .unwrap_or_else(|| format!("Phase {}", depth + 1));

        let start_task = group.first().map(|t| t.global_id.clone()).unwrap_or_default();
        let end_task = group.last().map(|t| t.global_id.clone()).unwrap_or_default();

        phases.push(PhaseInfo {
            id: depth + 1,
            name,
            start_task,
            end_task,
            tasks: group,
        });
    }

    phases
}

/// Full C7 pipeline: detect cycles, compute depths, assign phases.
pub fn validate_and_assign_phases(
    tasks: &[MergedTask],
    epic_titles: &HashMap<String, String>,
) -> Result<Vec<PhaseInfo>, DagError> {
    detect_cycle(tasks)?;
    let depths = compute_depths(tasks);
    Ok(assign_phases(tasks, &depths, epic_titles))
}
