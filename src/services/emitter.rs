//! C8 — Emitter: re-sequences global ids, slugifies filenames, and writes
//! every on-disk artifact. No direct donor counterpart (the donor has no
//! markdown-task emission layer) — built fresh against spec.md §4.8/§6,
//! using `tokio::fs` for the same async file-I/O idiom the rest of the
//! infrastructure layer uses.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::domain::error::EmitError;
use crate::domain::models::merged_task::format_global_id;
use crate::domain::models::{MergedTask, PhaseInfo, TaskState};
use crate::services::dag;

const MAX_SLUG_LEN: usize = 50;
const MAX_TASKS_FOR_MERMAID: usize = 100;

pub struct EmitResult {
    pub output_dir: PathBuf,
    pub task_files: Vec<PathBuf>,
    pub task_state_path: PathBuf,
    pub phases_path: PathBuf,
    pub progress_path: PathBuf,
    pub index_path: PathBuf,
    pub total_tasks: usize,
}

/// Reassign dense `T-NNN`/`T-NNNN` ids in the tasks' current order, rewriting
/// every dependency reference through the resulting old→new map. Gaps only
/// appear here when deduplication removed tasks after the merger's initial
/// assignment.
pub fn resequence_ids(tasks: Vec<MergedTask>) -> (Vec<MergedTask>, HashMap<String, String>) {
    let total = tasks.len();
    let old_to_new: HashMap<String, String> = tasks
        .iter()
        .enumerate()
        .map(|(i, t)| (t.global_id.clone(), format_global_id((i + 1) as u32, total)))
        .collect();

    let resequenced = tasks
        .into_iter()
        .map(|mut t| {
            t.global_id = old_to_new[&t.global_id].clone();
            t.dependencies = t.dependencies.iter().map(|d| old_to_new.get(d).cloned().unwrap_or_else(|| d.clone())).collect();
            t
        })
        .collect();

    (resequenced, old_to_new)
}

/// Slugify a title: lowercase, collapse any run of non-alphanumerics to a
/// single hyphen, trim leading/trailing hyphens, truncate at the last
/// hyphen boundary that fits within 50 characters. Returns an empty string
/// (caller substitutes the lowercased global id) when nothing alphanumeric
/// survives.
pub fn slugify(title: &str) -> String {
    let lower = title.to_lowercase();
    let mut slug = String::with_capacity(lower.len());
    let mut last_was_hyphen = false;
    for c in lower.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_was_hyphen = false;
        } else if !last_was_hyphen && !slug.is_empty() {
            slug.push('-');
            last_was_hyphen = true;
        }
    }
    let trimmed = slug.trim_end_matches('-');
    truncate_at_hyphen(trimmed, MAX_SLUG_LEN)
}

fn truncate_at_hyphen(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let cut: String = s.chars().take(max_len).collect();
    let result = match cut.rfind('-') {
        Some(idx) if idx > 0 => cut[..idx].to_string(),
        _ => cut,
    };
    result.trim_end_matches('-').to_string()
}

/// Derive a unique `<GlobalID>-<slug>.md` filename per task, appending
/// `-2`, `-3`, … to the slug of the second and subsequent colliding tasks.
pub fn unique_filenames(tasks: &[MergedTask]) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::new();
    let mut names = Vec::with_capacity(tasks.len());
    for task in tasks {
        let mut slug = slugify(&task.title);
        if slug.is_empty() {
            slug = task.global_id.to_lowercase();
        }
        let mut candidate = format!("{}-{}.md", task.global_id, slug);
        let mut suffix = 2;
        while used.contains(&candidate) {
            candidate = format!("{}-{}-{}.md", task.global_id, slug, suffix);
            suffix += 1;
        }
        used.insert(candidate.clone());
        names.push(candidate);
    }
    names
}

fn render_task_markdown(task: &MergedTask) -> String {
    let deps = if task.dependencies.is_empty() { "None".to_string() } else { task.dependencies.join(", ") };
    let criteria = task
        .acceptance_criteria
        .iter()
        .map(|c| format!("- [ ] {c}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "# {}: {}\n\n| Field | Value |\n|---|---|\n| Priority | {} |\n| Effort | {} |\n| Dependencies | {} |\n\n## Goal\n\n{}\n\n## Acceptance Criteria\n\n{}\n",
        task.global_id,
        task.title,
        task.priority.as_str(),
        task.effort.as_str(),
        deps,
        task.description,
        criteria,
    )
}

fn render_task_state(tasks: &[MergedTask]) -> String {
    let mut out = String::from("# global_id|status|agent|start_time|end_time\n");
    for task in tasks {
        out.push_str(&TaskState::not_started(&task.global_id).to_line());
        out.push('\n');
    }
    out
}

fn render_phases_conf(phases: &[PhaseInfo]) -> String {
    let mut out = String::from("# phase_id|name|start_task|end_task\n");
    for phase in phases {
        out.push_str(&format!("{}|{}|{}|{}\n", phase.id, phase.name, phase.start_task, phase.end_task));
    }
    out
}

fn render_progress_md(tasks: &[MergedTask], phases: &[PhaseInfo]) -> String {
    let mut out = format!("# Progress\n\n| Status | Count |\n|---|---|\n| not_started | {} |\n\n## Phases\n\n", tasks.len());
    for phase in phases {
        out.push_str(&format!("### Phase {}: {}\n\n", phase.id, phase.name));
        for task in &phase.tasks {
            out.push_str(&format!("- {} {}\n", task.global_id, task.title));
        }
        out.push('\n');
    }
    out
}

fn render_index_md(tasks: &[MergedTask], phases: &[PhaseInfo]) -> String {
    let mut out = String::from("# Index\n\n| GlobalID | Title | Priority | Effort | Deps |\n|---|---|---|---|---|\n");
    for task in tasks {
        let title = task.title.replace('|', "&#124;");
        let deps = if task.dependencies.is_empty() { "None".to_string() } else { task.dependencies.join(", ") };
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            task.global_id,
            title,
            task.priority.as_str(),
            task.effort.as_str(),
            deps
        ));
    }

    out.push_str("\n## Phases\n\n");
    for phase in phases {
        out.push_str(&format!("### Phase {}: {}\n\n", phase.id, phase.name));
        for task in &phase.tasks {
            out.push_str(&format!("- {}\n", task.global_id));
        }
        out.push('\n');
    }

    let has_deps = tasks.iter().any(|t| !t.dependencies.is_empty());
    if tasks.len() <= MAX_TASKS_FOR_MERMAID && has_deps {
        out.push_str("\n## Dependency Graph\n\n```mermaid\ngraph TD\n");
        for task in tasks {
            for dep in &task.dependencies {
                out.push_str(&format!("    {} --> {}\n", sanitize_mermaid_id(dep), sanitize_mermaid_id(&task.global_id)));
            }
        }
        out.push_str("```\n");
    }

    out
}

fn sanitize_mermaid_id(id: &str) -> String {
    id.replace('-', "_")
}

async fn refuse_overwrite(path: &Path, force: bool) -> Result<(), EmitError> {
    if !force && tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(EmitError::WouldOverwrite(path.to_path_buf()));
    }
    Ok(())
}

/// Re-sequence ids, assign phases from the (remapped) depth map, and write
/// every artifact under `output_dir`. Refuses to overwrite any existing
/// file unless `force` is set.
pub async fn emit(
    tasks: Vec<MergedTask>,
    depths: &HashMap<String, u32>,
    epic_titles: &HashMap<String, String>,
    output_dir: &Path,
    force: bool,
) -> Result<EmitResult, EmitError> {
    let (resequenced, old_to_new) = resequence_ids(tasks);
    let remapped_depths: HashMap<String, u32> =
        depths.iter().filter_map(|(old_id, depth)| old_to_new.get(old_id).map(|new_id| (new_id.clone(), *depth))).collect();
    let phases = dag::assign_phases(&resequenced, &remapped_depths, epic_titles);

    tokio::fs::create_dir_all(output_dir).await?;

    let filenames = unique_filenames(&resequenced);
    let mut task_files = Vec::with_capacity(resequenced.len());
    for (task, filename) in resequenced.iter().zip(filenames.iter()) {
        let path = output_dir.join(filename);
        refuse_overwrite(&path, force).await?;
        tokio::fs::write(&path, render_task_markdown(task)).await?;
        task_files.push(path);
    }

    let task_state_path = output_dir.join("task-state.conf");
    refuse_overwrite(&task_state_path, force).await?;
    tokio::fs::write(&task_state_path, render_task_state(&resequenced)).await?;

    let phases_path = output_dir.join("phases.conf");
    refuse_overwrite(&phases_path, force).await?;
    tokio::fs::write(&phases_path, render_phases_conf(&phases)).await?;

    let progress_path = output_dir.join("PROGRESS.md");
    refuse_overwrite(&progress_path, force).await?;
    tokio::fs::write(&progress_path, render_progress_md(&resequenced, &phases)).await?;

    let index_path = output_dir.join("INDEX.md");
    refuse_overwrite(&index_path, force).await?;
    tokio::fs::write(&index_path, render_index_md(&resequenced, &phases)).await?;

    Ok(EmitResult {
        output_dir: output_dir.to_path_buf(),
        total_tasks: resequenced.len(),
        task_files,
        task_state_path,
        phases_path,
        progress_path,
        index_path,
    })
}
