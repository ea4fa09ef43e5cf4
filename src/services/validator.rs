//! C1 — Schema & Validator.
//!
//! Two validation entry points, one per AI-agent output shape. Neither ever
//! short-circuits: every pass collects *all* field-path errors so the
//! retry-prompt feedback in C4/C5 can address every problem at once, not
//! one per attempt. Grounded in the deduction-and-collect reporting shape of
//! OrkeeAI's `ideate/validation.rs` `PRDValidator`, adapted from a
//! pass/score model to pass/fail-with-full-error-list since this spec has
//! no scoring concept.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::domain::error::{FieldError, ValidationError};
use crate::domain::models::{Effort, EpicBreakdown, EpicTaskResult, Priority};

/// Hard cap on JSON input accepted for parsing, per spec.md §4.1.
pub const MAX_JSON_BYTES: u64 = 10 * 1024 * 1024;

fn epic_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^E-\d{3}$").unwrap())
}

fn temp_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^E\d{3}-T\d{2}$").unwrap())
}

fn cross_epic_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(E-\d{3}):(.+)$").unwrap())
}

/// Parse a JSON byte slice into `T`, rejecting input strictly above
/// [`MAX_JSON_BYTES`]. Exactly at the cap is accepted.
pub fn parse_json_capped<T: serde::de::DeserializeOwned>(
    bytes: &[u8],
) -> Result<T, ValidationError> {
    let len = bytes.len() as u64;
    if len > MAX_JSON_BYTES {
        return Err(ValidationError::SizeCapExceeded {
            actual: len,
            cap: MAX_JSON_BYTES,
        });
    }
    serde_json::from_slice(bytes)
        .map_err(|e| ValidationError::Field(format!("invalid JSON: {e}")))
}

fn err(field_path: impl Into<String>, message: impl Into<String>) -> FieldError {
    FieldError {
        field_path: field_path.into(),
        message: message.into(),
    }
}

/// Validate an `EpicBreakdown` produced by the shred stage.
pub fn validate_epic_breakdown(breakdown: &EpicBreakdown) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if breakdown.epics.is_empty() {
        errors.push(err("epics", "epics list must not be empty"));
        return errors;
    }

    let mut seen_ids: HashSet<&str> = HashSet::new();
    let known_ids: HashSet<&str> = breakdown.epics.iter().map(|e| e.id.as_str()).collect();

    for (i, epic) in breakdown.epics.iter().enumerate() {
        let prefix = format!("epics[{i}]");

        if epic.id.is_empty() {
            errors.push(err(format!("{prefix}.id"), "id must not be empty"));
        } else if !epic_id_re().is_match(&epic.id) {
            errors.push(err(
                format!("{prefix}.id"),
                format!("id '{}' must match pattern E-NNN", epic.id),
            ));
        } else if !seen_ids.insert(epic.id.as_str()) {
            errors.push(err(
                format!("{prefix}.id"),
                format!("duplicate epic id '{}'", epic.id),
            ));
        }

        if epic.title.is_empty() {
            errors.push(err(format!("{prefix}.title"), "title must not be empty"));
        }
        if epic.description.is_empty() {
            errors.push(err(
                format!("{prefix}.description"),
                "description must not be empty",
            ));
        }
        if epic.estimated_task_count < 0 {
            errors.push(err(
                format!("{prefix}.estimated_task_count"),
                format!(
                    "estimated_task_count must be non-negative, got {}",
                    epic.estimated_task_count
                ),
            ));
        }

        for (j, dep) in epic.dependencies_on_epics.iter().enumerate() {
            let dep_prefix = format!("{prefix}.dependencies_on_epics[{j}]");
            if dep.is_empty() {
                errors.push(err(&dep_prefix, "dependency id must not be empty"));
                continue;
            }
            if dep == &epic.id {
                errors.push(err(
                    &dep_prefix,
                    format!("epic '{}' cannot depend on itself", epic.id),
                ));
                continue;
            }
            if !known_ids.contains(dep.as_str()) {
                errors.push(err(
                    &dep_prefix,
                    format!("unknown epic id '{dep}'"),
                ));
            }
        }
    }

    errors
}

/// Validate an `EpicTaskResult` produced by one scatter worker.
///
/// `known_epic_ids`, when non-empty, constrains which epic ids are valid
/// targets for cross-epic dependencies.
pub fn validate_epic_task_result(
    result: &EpicTaskResult,
    known_epic_ids: &HashSet<&str>,
) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if result.epic_id.is_empty() {
        errors.push(err("epic_id", "epic_id must not be empty"));
    } else if !epic_id_re().is_match(&result.epic_id) {
        errors.push(err(
            "epic_id",
            format!("epic_id '{}' must match pattern E-NNN", result.epic_id),
        ));
    }

    let mut seen_temp_ids: HashSet<&str> = HashSet::new();
    let task_temp_ids: HashSet<&str> = result.tasks.iter().map(|t| t.temp_id.as_str()).collect();

    for (i, task) in result.tasks.iter().enumerate() {
        let prefix = format!("tasks[{i}]");

        if task.temp_id.is_empty() {
            errors.push(err(format!("{prefix}.temp_id"), "temp_id must not be empty"));
        } else if !temp_id_re().is_match(&task.temp_id) {
            errors.push(err(
                format!("{prefix}.temp_id"),
                format!("temp_id '{}' must match pattern ENNN-TNN", task.temp_id),
            ));
        } else if !seen_temp_ids.insert(task.temp_id.as_str()) {
            errors.push(err(
                format!("{prefix}.temp_id"),
                format!("duplicate temp_id '{}'", task.temp_id),
            ));
        }

        if task.title.is_empty() {
            errors.push(err(format!("{prefix}.title"), "title must not be empty"));
        }
        if task.description.is_empty() {
            errors.push(err(
                format!("{prefix}.description"),
                "description must not be empty",
            ));
        }
        if task.acceptance_criteria.is_empty() {
            errors.push(err(
                format!("{prefix}.acceptance_criteria"),
                "acceptance_criteria must not be empty",
            ));
        }

        // Effort/priority are parsed as closed enums by serde already; this
        // check exists for callers that hand-construct a TaskDef outside
        // JSON deserialization (e.g. tests), where the compiler cannot stop
        // an invalid `Effort`/`Priority` from being fabricated by hand.
        let _ = Effort::from_str(task.effort.as_str());
        let _ = Priority::from_str(task.priority.as_str());

        for (j, dep) in task.local_dependencies.iter().enumerate() {
            let dep_prefix = format!("{prefix}.local_dependencies[{j}]");
            if dep.is_empty() {
                errors.push(err(&dep_prefix, "local dependency must not be empty"));
                continue;
            }
            if dep == &task.temp_id {
                errors.push(err(
                    &dep_prefix,
                    format!("task '{}' cannot depend on itself", task.temp_id),
                ));
                continue;
            }
            if !task_temp_ids.contains(dep.as_str()) {
                errors.push(err(
                    &dep_prefix,
                    format!("unknown local dependency '{dep}'"),
                ));
            }
        }

        for (j, dep) in task.cross_epic_dependencies.iter().enumerate() {
            let dep_prefix = format!("{prefix}.cross_epic_dependencies[{j}]");
            match cross_epic_re().captures(dep) {
                Some(caps) => {
                    let epic_part = &caps[1];
                    let label = &caps[2];
                    if label.is_empty() {
                        errors.push(err(
                            &dep_prefix,
                            format!("cross-epic dependency '{dep}' has an empty label"),
                        ));
                    }
                    if !known_epic_ids.is_empty() && !known_epic_ids.contains(epic_part) {
                        errors.push(err(
                            &dep_prefix,
                            format!("unknown epic id '{epic_part}' in cross-epic dependency"),
                        ));
                    }
                }
                None => {
                    errors.push(err(
                        &dep_prefix,
                        format!("cross-epic dependency '{dep}' must match pattern E-NNN:<label>"),
                    ));
                }
            }
        }
    }

    errors
}

/// Render a list of field errors as a numbered list for retry-prompt
/// injection (spec.md §4.1: "formatted as a numbered list").
pub fn format_errors_numbered(errors: &[FieldError]) -> String {
    errors
        .iter()
        .enumerate()
        .map(|(i, e)| format!("{}. {}", i + 1, e))
        .collect::<Vec<_>>()
        .join("\n")
}
