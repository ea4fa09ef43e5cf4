//! Property tests for the merge pipeline and DAG validator: dedup
//! conservation, dense global-id assignment, and the depth/phase ordering
//! relationship. Modeled on the donor's
//! `tests/property_dependency_resolver.rs` (`proptest!` blocks generating a
//! graph shape, asserting a structural invariant on the algorithm's output).

use std::collections::{HashMap, HashSet};

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use raven::domain::models::{Effort, Epic, EpicBreakdown, EpicTaskResult, Priority, TaskDef};
use raven::services::dag::{compute_depths, validate_and_assign_phases};
use raven::services::merger::merge;

fn task(temp_id: &str, title: &str, local_deps: &[&str]) -> TaskDef {
    TaskDef {
        temp_id: temp_id.to_string(),
        title: title.to_string(),
        description: String::new(),
        acceptance_criteria: vec!["done".to_string()],
        local_dependencies: local_deps.iter().map(|s| s.to_string()).collect(),
        cross_epic_dependencies: vec![],
        effort: Effort::Small,
        priority: Priority::MustHave,
    }
}

/// Build a linear chain of `size` epics, each with one task, the task in
/// epic `i` depending on the task in epic `i - 1`. Every task title is
/// unique, so merge's dedup pass is a no-op and output count is exact.
fn linear_chain(size: usize) -> (EpicBreakdown, HashMap<String, EpicTaskResult>) {
    let ids: Vec<String> = (0..size).map(|i| format!("E-{i:03}")).collect();
    let epics: Vec<Epic> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| Epic {
            id: id.clone(),
            title: id.clone(),
            description: String::new(),
            prd_sections: vec![],
            estimated_task_count: 1,
            dependencies_on_epics: if i == 0 { vec![] } else { vec![ids[i - 1].clone()] },
        })
        .collect();

    let mut results = HashMap::new();
    for (i, id) in ids.iter().enumerate() {
        let temp_id = format!("{}-T01", id.replace('-', ""));
        results.insert(
            id.clone(),
            EpicTaskResult { epic_id: id.clone(), tasks: vec![task(&temp_id, &format!("Unique task {i}"), &[])] },
        );
    }

    (EpicBreakdown { epics }, results)
}

proptest! {
    /// Property: merging a duplicate-free linear epic chain neither drops
    /// nor invents tasks — output count equals input task count.
    #[test]
    fn prop_merge_preserves_task_count_with_no_duplicates(size in 1usize..15) {
        let (breakdown, results) = linear_chain(size);
        let output = merge(&breakdown, &results).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(output.tasks.len(), size);
        prop_assert!(output.dedup_report.merge_records.is_empty());
    }

    /// Property: global ids assigned by the merge are dense `T-NNN` values
    /// starting at 1, with no gaps or repeats.
    #[test]
    fn prop_merge_assigns_dense_global_ids(size in 1usize..15) {
        let (breakdown, results) = linear_chain(size);
        let output = merge(&breakdown, &results).map_err(|e| TestCaseError::fail(e.to_string()))?;

        let mut numeric: Vec<u32> = output.tasks.iter().filter_map(|t| t.numeric_id()).collect();
        numeric.sort_unstable();
        let expected: Vec<u32> = (1..=size as u32).collect();
        prop_assert_eq!(numeric, expected);
    }

    /// Property: for any task, its computed depth is strictly greater than
    /// the depth of every dependency it declares — the DAG depth relation
    /// never loops back on itself.
    #[test]
    fn prop_depth_strictly_increases_across_dependency_edges(size in 1usize..15) {
        let (breakdown, results) = linear_chain(size);
        let output = merge(&breakdown, &results).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let depths = compute_depths(&output.tasks);

        let by_id: HashMap<&str, &raven::domain::models::MergedTask> =
            output.tasks.iter().map(|t| (t.global_id.as_str(), t)).collect();

        for t in &output.tasks {
            let own_depth = depths[&t.global_id];
            for dep in &t.dependencies {
                if by_id.contains_key(dep.as_str()) {
                    prop_assert!(
                        depths[dep] < own_depth,
                        "dependency {} (depth {}) should precede {} (depth {})",
                        dep, depths[dep], t.global_id, own_depth
                    );
                }
            }
        }
    }

    /// Property: phase assignment never separates a task from a dependency
    /// into a later-or-equal phase — every dependency's phase id is
    /// strictly less than its dependent's phase id.
    #[test]
    fn prop_phases_respect_dependency_order(size in 1usize..15) {
        let (breakdown, results) = linear_chain(size);
        let output = merge(&breakdown, &results).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let phases = validate_and_assign_phases(&output.tasks, &HashMap::new())
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        let phase_of: HashMap<&str, u32> =
            phases.iter().flat_map(|p| p.tasks.iter().map(move |t| (t.global_id.as_str(), p.id))).collect();

        for t in &output.tasks {
            for dep in &t.dependencies {
                if let (Some(dep_phase), Some(own_phase)) = (phase_of.get(dep.as_str()), phase_of.get(t.global_id.as_str())) {
                    prop_assert!(dep_phase < own_phase);
                }
            }
        }
    }

    /// Property: the set of global ids phases partition matches the set of
    /// global ids merge produced — phase assignment neither drops nor
    /// duplicates a task.
    #[test]
    fn prop_phases_partition_all_tasks_exactly_once(size in 1usize..15) {
        let (breakdown, results) = linear_chain(size);
        let output = merge(&breakdown, &results).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let phases = validate_and_assign_phases(&output.tasks, &HashMap::new())
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        let mut seen: Vec<String> = phases.iter().flat_map(|p| p.tasks.iter().map(|t| t.global_id.clone())).collect();
        seen.sort();
        let mut expected: Vec<String> = output.tasks.iter().map(|t| t.global_id.clone()).collect();
        expected.sort();

        prop_assert_eq!(seen.len(), expected.len());
        prop_assert_eq!(seen.into_iter().collect::<HashSet<_>>(), expected.into_iter().collect::<HashSet<_>>());
    }
}
