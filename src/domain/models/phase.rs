//! PhaseInfo: a contiguous band of tasks at equal dependency depth.

use serde::{Deserialize, Serialize};

use super::merged_task::MergedTask;

/// One phase in the dependency-ordered execution plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseInfo {
    /// 1-based ordinal; equals depth + 1.
    pub id: u32,
    pub name: String,
    pub start_task: String,
    pub end_task: String,
    pub tasks: Vec<MergedTask>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::task_def::{Effort, Priority};

    fn task(id: &str) -> MergedTask {
        MergedTask {
            global_id: id.to_string(),
            temp_id: "E001-T01".to_string(),
            epic_id: "E-001".to_string(),
            title: "t".to_string(),
            description: "d".to_string(),
            acceptance_criteria: vec![],
            dependencies: vec![],
            effort: Effort::Small,
            priority: Priority::MustHave,
        }
    }

    #[test]
    fn phase_carries_start_and_end() {
        let phase = PhaseInfo {
            id: 1,
            name: "Phase 1".to_string(),
            start_task: "T-001".to_string(),
            end_task: "T-003".to_string(),
            tasks: vec![task("T-001"), task("T-002"), task("T-003")],
        };
        assert_eq!(phase.tasks.first().unwrap().global_id, phase.start_task);
        assert_eq!(phase.tasks.last().unwrap().global_id, phase.end_task);
    }
}
