//! MergedTask: post-merge task with a stable global identity.

use serde::{Deserialize, Serialize};

use super::task_def::{Effort, Priority};

/// A task after global-id assignment, dependency remapping, and
/// deduplication have all run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedTask {
    /// `T-NNN`, or `T-NNNN` once the total exceeds 999.
    pub global_id: String,
    /// The temp-id this task originated from, kept for traceability.
    pub temp_id: String,
    pub epic_id: String,
    pub title: String,
    pub description: String,
    pub acceptance_criteria: Vec<String>,
    /// Resolved dependencies, unioning local and cross-epic references.
    /// Every entry refers to another `MergedTask` in the same batch; no
    /// self-references.
    pub dependencies: Vec<String>,
    pub effort: Effort,
    pub priority: Priority,
}

impl MergedTask {
    /// Numeric part of `global_id`, used for sorting and re-sequencing.
    pub fn numeric_id(&self) -> Option<u32> {
        self.global_id.strip_prefix("T-").and_then(|s| s.parse().ok())
    }
}

/// Format a 1-based global id counter as `T-NNN` (or `T-NNNN` at ≥1000),
/// given the total count of tasks being numbered in this batch.
pub fn format_global_id(ordinal: u32, total: usize) -> String {
    if total >= 1000 {
        format!("T-{ordinal:04}")
    } else {
        format!("T-{ordinal:03}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_global_id_pads_to_three_digits_under_1000() {
        assert_eq!(format_global_id(1, 999), "T-001");
        assert_eq!(format_global_id(999, 999), "T-999");
    }

    #[test]
    fn format_global_id_switches_to_four_digits_at_1000() {
        assert_eq!(format_global_id(1, 1000), "T-0001");
        assert_eq!(format_global_id(1000, 1000), "T-1000");
    }

    #[test]
    fn numeric_id_parses() {
        let task = MergedTask {
            global_id: "T-042".to_string(),
            temp_id: "E001-T01".to_string(),
            epic_id: "E-001".to_string(),
            title: "x".to_string(),
            description: "x".to_string(),
            acceptance_criteria: vec![],
            dependencies: vec![],
            effort: Effort::Small,
            priority: Priority::MustHave,
        };
        assert_eq!(task.numeric_id(), Some(42));
    }
}
