//! C6.2 — Global ID assignment.

use std::collections::{HashMap, HashSet};

use crate::domain::models::merged_task::format_global_id;
use crate::domain::models::{EpicTaskResult, MergedTask};

/// Dependency references carried forward from a `TaskDef` until the remap
/// stage resolves them into global ids.
#[derive(Debug, Default, Clone)]
pub struct PendingDeps {
    pub local: Vec<String>,
    pub cross: Vec<String>,
}

pub struct AssignmentResult {
    pub tasks: Vec<MergedTask>,
    pub temp_id_to_global: HashMap<String, String>,
    pub pending_deps: HashMap<String, PendingDeps>,
}

/// Assign dense global ids in topological-epic-order, then declaration
/// order within each epic. Tasks with an empty `temp_id` consume no counter
/// slot. Epics present in `results` but absent from `epic_order` are
/// appended afterward in lexicographic id order; epics in `epic_order` but
/// absent from `results` are skipped without leaving a numbering gap.
pub fn assign_global_ids(
    epic_order: &[String],
    results: &HashMap<String, EpicTaskResult>,
) -> AssignmentResult {
    let ordered: HashSet<&str> = epic_order.iter().map(String::as_str).collect();
    let mut order: Vec<String> = epic_order.to_vec();
    let mut extra: Vec<String> = results
        .keys()
        .filter(|id| !ordered.contains(id.as_str()))
        .cloned()
        .collect();
    extra.sort();
    order.extend(extra);

    let mut consumable: Vec<(&str, &crate::domain::models::TaskDef)> = Vec::new();
    for epic_id in &order {
        if let Some(result) = results.get(epic_id) {
            for task in &result.tasks {
                if !task.temp_id.is_empty() {
                    consumable.push((epic_id.as_str(), task));
                }
            }
        }
    }

    let total = consumable.len();
    let mut tasks = Vec::with_capacity(total);
    let mut temp_id_to_global = HashMap::new();
    let mut pending_deps = HashMap::new();

    for (i, (epic_id, task)) in consumable.into_iter().enumerate() {
        let global_id = format_global_id((i + 1) as u32, total);
        temp_id_to_global.insert(task.temp_id.clone(), global_id.clone());
        pending_deps.insert(
            global_id.clone(),
            PendingDeps {
                local: task.local_dependencies.clone(),
                cross: task.cross_epic_dependencies.clone(),
            },
        );
        tasks.push(MergedTask {
            global_id,
            temp_id: task.temp_id.clone(),
            epic_id: epic_id.to_string(),
            title: task.title.clone(),
            description: task.description.clone(),
            acceptance_criteria: task.acceptance_criteria.clone(),
            dependencies: Vec::new(),
            effort: task.effort,
            priority: task.priority,
        });
    }

    AssignmentResult {
        tasks,
        temp_id_to_global,
        pending_deps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Effort, Priority, TaskDef};

    fn task(temp_id: &str) -> TaskDef {
        TaskDef {
            temp_id: temp_id.to_string(),
            title: "t".to_string(),
            description: "d".to_string(),
            acceptance_criteria: vec!["c".to_string()],
            local_dependencies: vec![],
            cross_epic_dependencies: vec![],
            effort: Effort::Small,
            priority: Priority::MustHave,
        }
    }

    #[test]
    fn assigns_in_epic_order_then_declaration_order() {
        let mut results = HashMap::new();
        results.insert(
            "E-001".to_string(),
            EpicTaskResult { epic_id: "E-001".to_string(), tasks: vec![task("E001-T01"), task("E001-T02")] },
        );
        results.insert(
            "E-002".to_string(),
            EpicTaskResult { epic_id: "E-002".to_string(), tasks: vec![task("E002-T01")] },
        );
        let order = vec!["E-001".to_string(), "E-002".to_string()];
        let assignment = assign_global_ids(&order, &results);

        let ids: Vec<&str> = assignment.tasks.iter().map(|t| t.global_id.as_str()).collect();
        assert_eq!(ids, vec!["T-001", "T-002", "T-003"]);
        assert_eq!(assignment.temp_id_to_global["E001-T01"], "T-001");
        assert_eq!(assignment.temp_id_to_global["E002-T01"], "T-003");
    }

    #[test]
    fn empty_temp_id_consumes_no_slot() {
        let mut results = HashMap::new();
        results.insert(
            "E-001".to_string(),
            EpicTaskResult {
                epic_id: "E-001".to_string(),
                tasks: vec![task(""), task("E001-T01")],
            },
        );
        let order = vec!["E-001".to_string()];
        let assignment = assign_global_ids(&order, &results);
        assert_eq!(assignment.tasks.len(), 1);
        assert_eq!(assignment.tasks[0].global_id, "T-001");
    }

    #[test]
    fn epic_missing_from_order_is_appended_lexicographically() {
        let mut results = HashMap::new();
        results.insert(
            "E-002".to_string(),
            EpicTaskResult { epic_id: "E-002".to_string(), tasks: vec![task("E002-T01")] },
        );
        results.insert(
            "E-001".to_string(),
            EpicTaskResult { epic_id: "E-001".to_string(), tasks: vec![task("E001-T01")] },
        );
        let order: Vec<String> = vec![]; // neither epic was in the topo order
        let assignment = assign_global_ids(&order, &results);
        let ids: Vec<&str> = assignment.tasks.iter().map(|t| t.epic_id.as_str()).collect();
        assert_eq!(ids, vec!["E-001", "E-002"]);
    }

    #[test]
    fn epic_in_order_but_missing_from_results_leaves_no_gap() {
        let mut results = HashMap::new();
        results.insert(
            "E-002".to_string(),
            EpicTaskResult { epic_id: "E-002".to_string(), tasks: vec![task("E002-T01")] },
        );
        let order = vec!["E-001".to_string(), "E-002".to_string()];
        let assignment = assign_global_ids(&order, &results);
        assert_eq!(assignment.tasks.len(), 1);
        assert_eq!(assignment.tasks[0].global_id, "T-001");
    }
}
