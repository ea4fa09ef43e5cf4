//! C6 — Merger: topological sort, global ID assignment, dependency
//! remapping, and deduplication, composed into a single pipeline.

pub mod assign;
pub mod dedup;
pub mod remap;
pub mod topo;

use std::collections::HashMap;

use crate::domain::error::MergeError;
use crate::domain::models::{EpicBreakdown, EpicTaskResult, MergedTask};

pub use assign::PendingDeps;
pub use dedup::{DedupReport, MergeRecord};
pub use remap::{AmbiguousRef, RemapReport, UnresolvedRef};

pub struct MergeOutput {
    pub tasks: Vec<MergedTask>,
    pub remap_report: RemapReport,
    pub dedup_report: DedupReport,
}

/// Run the full merge pipeline: sort epics, assign global ids, remap
/// dependencies, deduplicate by normalized title.
pub fn merge(
    breakdown: &EpicBreakdown,
    results: &HashMap<String, EpicTaskResult>,
) -> Result<MergeOutput, MergeError> {
    let epic_order = topo::topological_sort_epics(&breakdown.epics)?;
    let assignment = assign::assign_global_ids(&epic_order, results);
    let (remapped, remap_report) = remap::remap_dependencies(
        &assignment.tasks,
        &assignment.pending_deps,
        &assignment.temp_id_to_global,
        results,
    );
    let (deduped, dedup_report) = dedup::dedup_tasks(remapped);

    Ok(MergeOutput {
        tasks: deduped,
        remap_report,
        dedup_report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Effort, Epic, Priority, TaskDef};

    fn epic(id: &str, deps: &[&str]) -> Epic {
        Epic {
            id: id.to_string(),
            title: id.to_string(),
            description: String::new(),
            prd_sections: vec![],
            estimated_task_count: 2,
            dependencies_on_epics: deps.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn task(temp_id: &str, local_deps: &[&str]) -> TaskDef {
        TaskDef {
            temp_id: temp_id.to_string(),
            title: format!("Task {temp_id}"),
            description: String::new(),
            acceptance_criteria: vec!["done".to_string()],
            local_dependencies: local_deps.iter().map(|s| s.to_string()).collect(),
            cross_epic_dependencies: vec![],
            effort: Effort::Small,
            priority: Priority::MustHave,
        }
    }

    #[test]
    fn linear_epic_chain_assigns_six_tasks_in_order() {
        let breakdown = EpicBreakdown {
            epics: vec![epic("E-001", &[]), epic("E-002", &["E-001"]), epic("E-003", &["E-002"])],
        };
        let mut results = HashMap::new();
        for id in ["E-001", "E-002", "E-003"] {
            let prefix = id.replace('-', "").to_lowercase();
            results.insert(
                id.to_string(),
                EpicTaskResult {
                    epic_id: id.to_string(),
                    tasks: vec![
                        task(&format!("{}-T01", id.replace('-', "")), &[]),
                        task(&format!("{}-T02", id.replace('-', "")), &[&format!("{}-T01", id.replace('-', ""))]),
                    ],
                },
            );
            let _ = prefix;
        }

        let output = merge(&breakdown, &results).unwrap();
        let ids: Vec<&str> = output.tasks.iter().map(|t| t.global_id.as_str()).collect();
        assert_eq!(ids, vec!["T-001", "T-002", "T-003", "T-004", "T-005", "T-006"]);
    }

    #[test]
    fn cycle_in_epic_graph_propagates_as_merge_error() {
        let breakdown = EpicBreakdown {
            epics: vec![epic("E-001", &["E-002"]), epic("E-002", &["E-001"])],
        };
        let results = HashMap::new();
        let err = merge(&breakdown, &results).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("cyclic epic dependency detected"));
        assert!(msg.contains("form a cycle"));
    }

    #[test]
    fn resolved_dependencies_never_self_reference() {
        let breakdown = EpicBreakdown { epics: vec![epic("E-001", &[])] };
        let mut results = HashMap::new();
        results.insert(
            "E-001".to_string(),
            EpicTaskResult { epic_id: "E-001".to_string(), tasks: vec![task("E001-T01", &["E001-T01"])] },
        );
        let output = merge(&breakdown, &results).unwrap();
        assert!(output.tasks[0].dependencies.is_empty());
    }
}
