//! Prompt templates handed to agent invocations.
//!
//! No direct donor counterpart — spec.md treats prompt rendering as an
//! opaque collaborator for the retry-loop algorithms, so these are fresh,
//! simple string builders rather than anything ported. Kept in one place so
//! the wording can change without touching the services that call them.

use std::path::Path;

use crate::domain::models::{Epic, MergedTask, PhaseInfo};
use crate::services::loop_runner::LoopConfig;

/// C4 shred prompt: PRD text, target output path, numbered errors from the
/// previous attempt (empty string on the first try).
pub fn render_shred_prompt(prd: &str, output_path: &Path, previous_errors: &str) -> String {
    let mut out = String::new();
    out.push_str("You are decomposing a product requirements document into epics.\n\n");
    out.push_str("Write a JSON object matching the EpicBreakdown schema (an \"epics\" array; ");
    out.push_str("each epic has id, title, description, prd_sections, estimated_task_count, ");
    out.push_str("dependencies_on_epics) to this exact path:\n");
    out.push_str(&format!("  {}\n\n", output_path.display()));
    if !previous_errors.is_empty() {
        out.push_str("Your previous attempt failed validation:\n");
        out.push_str(previous_errors);
        out.push_str("\nFix every listed error.\n\n");
    }
    out.push_str("PRD:\n\n");
    out.push_str(prd);
    out
}

/// C5 scatter prompt: the PRD, the epic being broken down, its declared
/// epic-level dependencies (for cross-epic context only), the target output
/// path, and numbered errors from the previous attempt for this epic.
pub fn render_scatter_prompt(
    prd: &str,
    epic: &Epic,
    dependency_epics: &[&Epic],
    output_path: &Path,
    previous_errors: &str,
) -> String {
    let mut out = String::new();
    out.push_str(&format!("You are decomposing epic {} (\"{}\") into implementation tasks.\n\n", epic.id, epic.title));
    out.push_str(&format!("Epic description: {}\n", epic.description));
    if !epic.prd_sections.is_empty() {
        out.push_str(&format!("Relevant PRD sections: {}\n", epic.prd_sections.join(", ")));
    }
    if !dependency_epics.is_empty() {
        out.push_str("\nThis epic depends on these epics (for context only, do not re-decompose them):\n");
        for dep in dependency_epics {
            out.push_str(&format!("  - {} ({})\n", dep.id, dep.title));
        }
    }
    out.push_str("\nWrite a JSON object matching the EpicTaskResult schema (epic_id plus a ");
    out.push_str("\"tasks\" array; each task has temp_id, title, description, ");
    out.push_str("acceptance_criteria, local_dependencies, cross_epic_dependencies, effort, ");
    out.push_str("priority) to this exact path:\n");
    out.push_str(&format!("  {}\n\n", output_path.display()));
    if !previous_errors.is_empty() {
        out.push_str("Your previous attempt failed validation:\n");
        out.push_str(previous_errors);
        out.push_str("\nFix every listed error.\n\n");
    }
    out.push_str("Full PRD, for reference:\n\n");
    out.push_str(prd);
    out
}

/// C9 loop prompt: the task to implement, and the phase it belongs to when
/// running in phase mode (`None` in single-task mode).
pub fn render_loop_prompt(task: &MergedTask, phase: Option<&PhaseInfo>, config: &LoopConfig) -> String {
    let mut out = String::new();
    if let Some(phase) = phase {
        out.push_str(&format!("Phase {}: {}\n\n", phase.id, phase.name));
    }
    out.push_str(&format!("Implement task {}: {}\n\n", task.global_id, task.title));
    out.push_str(&format!("{}\n\n", task.description));
    out.push_str("Acceptance criteria:\n");
    for criterion in &task.acceptance_criteria {
        out.push_str(&format!("- {criterion}\n"));
    }
    if !task.dependencies.is_empty() {
        out.push_str(&format!("\nDepends on (already completed): {}\n", task.dependencies.join(", ")));
    }
    out.push_str("\nWhen finished, print exactly one of these on its own line:\n");
    out.push_str("  PHASE_COMPLETE        if every task in this phase is now done\n");
    out.push_str("  TASK_BLOCKED: <why>   if this task cannot proceed\n");
    out.push_str("  RAVEN_ERROR: <why>    if an unrecoverable error occurred\n");
    if config.dry_run {
        out.push_str("\n(dry run: do not execute, only print the command that would run)\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Effort, Priority};
    use std::path::PathBuf;

    fn epic(id: &str) -> Epic {
        Epic {
            id: id.to_string(),
            title: "Auth".to_string(),
            description: "desc".to_string(),
            prd_sections: vec!["2.1".to_string()],
            estimated_task_count: 3,
            dependencies_on_epics: vec![],
        }
    }

    fn task() -> MergedTask {
        MergedTask {
            global_id: "T-001".to_string(),
            temp_id: "E001-T01".to_string(),
            epic_id: "E-001".to_string(),
            title: "Add login form".to_string(),
            description: "Build the login form".to_string(),
            acceptance_criteria: vec!["form renders".to_string()],
            dependencies: vec![],
            effort: Effort::Small,
            priority: Priority::MustHave,
        }
    }

    #[test]
    fn shred_prompt_includes_path_and_errors() {
        let prompt = render_shred_prompt("reqs", &PathBuf::from("/tmp/out.json"), "1. epics: empty");
        assert!(prompt.contains("/tmp/out.json"));
        assert!(prompt.contains("1. epics: empty"));
        assert!(prompt.contains("reqs"));
    }

    #[test]
    fn scatter_prompt_lists_dependency_epics() {
        let e = epic("E-002");
        let dep = epic("E-001");
        let prompt = render_scatter_prompt("reqs", &e, &[&dep], &PathBuf::from("/tmp/e2.json"), "");
        assert!(prompt.contains("E-002"));
        assert!(prompt.contains("E-001"));
    }

    #[test]
    fn loop_prompt_lists_acceptance_criteria_and_signals() {
        let prompt = render_loop_prompt(&task(), None, &LoopConfig::default());
        assert!(prompt.contains("form renders"));
        assert!(prompt.contains("PHASE_COMPLETE"));
        assert!(prompt.contains("TASK_BLOCKED"));
    }
}
