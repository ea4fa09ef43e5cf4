//! C6.4 — Title normalization and deduplication.

use std::collections::{HashMap, HashSet};

use crate::domain::models::MergedTask;

const VERB_PREFIXES: &[&str] = &[
    "implement ", "create ", "set up ", "add ", "build ", "define ", "write ", "configure ", "design ", "establish ",
];

/// Normalize a title for dedup grouping: lowercase, strip one leading verb
/// prefix (only when followed by a space), collapse whitespace, strip
/// punctuation. Deliberately lossy — "Implement X" and "Create X" collapse
/// to the same key. Falls back to the lowercased original if stripping
/// leaves nothing.
pub fn normalize_title(title: &str) -> String {
    let lower = title.to_lowercase();

    let mut stripped = lower.as_str();
    for prefix in VERB_PREFIXES {
        if let Some(rest) = stripped.strip_prefix(prefix) {
            stripped = rest;
            break;
        }
    }

    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    let cleaned: String = collapsed.chars().filter(|c| c.is_alphanumeric() || c.is_whitespace()).collect();
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    if cleaned.is_empty() {
        lower
    } else {
        cleaned
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRecord {
    pub keeper_global_id: String,
    pub merged_global_ids: Vec<String>,
    pub acceptance_criteria_added: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DedupReport {
    pub original_count: usize,
    pub removed_count: usize,
    pub final_count: usize,
    pub merge_records: Vec<MergeRecord>,
    pub rewritten_dependencies: usize,
}

/// Group tasks by normalized title; within each group of size ≥2, keep the
/// smallest-global-id task, fold the rest's acceptance criteria into it, and
/// rewrite every other task's dependency references to the removed ids.
pub fn dedup_tasks(tasks: Vec<MergedTask>) -> (Vec<MergedTask>, DedupReport) {
    let original_count = tasks.len();

    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, t) in tasks.iter().enumerate() {
        groups.entry(normalize_title(&t.title)).or_default().push(i);
    }

    let mut tasks = tasks;
    let mut removed_ids: HashSet<String> = HashSet::new();
    let mut redirect: HashMap<String, String> = HashMap::new();
    let mut merge_records = Vec::new();

    let mut keys: Vec<String> = groups.keys().cloned().collect();
    keys.sort();

    for key in &keys {
        let idxs = &groups[key];
        if idxs.len() < 2 {
            continue;
        }
        let mut sorted_idxs = idxs.clone();
        sorted_idxs.sort_by(|&a, &b| tasks[a].global_id.cmp(&tasks[b].global_id));
        let keeper_idx = sorted_idxs[0];
        let keeper_id = tasks[keeper_idx].global_id.clone();

        let mut merged_ids = Vec::new();
        let mut added = 0;
        for &idx in &sorted_idxs[1..] {
            let other_id = tasks[idx].global_id.clone();
            for criterion in tasks[idx].acceptance_criteria.clone() {
                if !tasks[keeper_idx].acceptance_criteria.contains(&criterion) {
                    tasks[keeper_idx].acceptance_criteria.push(criterion);
                    added += 1;
                }
            }
            removed_ids.insert(other_id.clone());
            redirect.insert(other_id.clone(), keeper_id.clone());
            merged_ids.push(other_id);
        }
        merge_records.push(MergeRecord {
            keeper_global_id: keeper_id,
            merged_global_ids: merged_ids,
            acceptance_criteria_added: added,
        });
    }

    let mut rewritten_dependencies = 0;
    for task in tasks.iter_mut() {
        let mut new_deps = Vec::new();
        for dep in &task.dependencies {
            let resolved = redirect.get(dep).cloned().unwrap_or_else(|| dep.clone());
            if resolved == task.global_id {
                continue;
            }
            if !new_deps.contains(&resolved) {
                new_deps.push(resolved);
            }
        }
        if new_deps != task.dependencies {
            rewritten_dependencies += 1;
        }
        task.dependencies = new_deps;
    }

    let final_tasks: Vec<MergedTask> = tasks.into_iter().filter(|t| !removed_ids.contains(&t.global_id)).collect();
    let removed_count = removed_ids.len();
    let final_count = final_tasks.len();

    (
        final_tasks,
        DedupReport {
            original_count,
            removed_count,
            final_count,
            merge_records,
            rewritten_dependencies,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Effort, Priority};

    fn task(global_id: &str, title: &str, deps: &[&str]) -> MergedTask {
        MergedTask {
            global_id: global_id.to_string(),
            temp_id: String::new(),
            epic_id: "E-001".to_string(),
            title: title.to_string(),
            description: String::new(),
            acceptance_criteria: vec![],
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
            effort: Effort::Small,
            priority: Priority::MustHave,
        }
    }

    #[test]
    fn verb_prefixes_collapse_to_same_key() {
        assert_eq!(normalize_title("Implement Login Page"), normalize_title("Create Login Page"));
    }

    #[test]
    fn punctuation_is_removed() {
        assert_eq!(normalize_title("Set up CI/CD pipeline!"), "cicd pipeline");
    }

    #[test]
    fn empty_after_stripping_falls_back_to_lowercased_original() {
        assert_eq!(normalize_title("Implement"), "implement");
    }

    #[test]
    fn conservation_law_holds() {
        let tasks = vec![
            task("T-002", "Implement Login Page", &[]),
            task("T-001", "Create Login Page", &[]),
            task("T-003", "Write docs", &[]),
        ];
        let (final_tasks, report) = dedup_tasks(tasks);
        assert_eq!(report.original_count, report.removed_count + report.final_count);
        assert_eq!(final_tasks.len(), report.final_count);
    }

    #[test]
    fn keeper_is_smallest_global_id() {
        let tasks = vec![
            task("T-002", "Implement Login Page", &[]),
            task("T-001", "Create Login Page", &[]),
        ];
        let (final_tasks, report) = dedup_tasks(tasks);
        assert_eq!(report.merge_records.len(), 1);
        assert_eq!(report.merge_records[0].keeper_global_id, "T-001");
        assert_eq!(final_tasks.len(), 1);
        assert_eq!(final_tasks[0].global_id, "T-001");
    }

    #[test]
    fn dependency_references_to_removed_task_are_rewritten_to_keeper() {
        let tasks = vec![
            task("T-001", "Create Login Page", &[]),
            task("T-002", "Implement Login Page", &[]),
            task("T-003", "Write docs", &["T-002"]),
        ];
        let (final_tasks, report) = dedup_tasks(tasks);
        assert_eq!(report.rewritten_dependencies, 1);
        let docs_task = final_tasks.iter().find(|t| t.global_id == "T-003").unwrap();
        assert_eq!(docs_task.dependencies, vec!["T-001".to_string()]);
    }

    #[test]
    fn rewrite_never_produces_self_reference() {
        let tasks = vec![
            task("T-001", "Create Login Page", &["T-002"]),
            task("T-002", "Implement Login Page", &[]),
        ];
        let (final_tasks, _) = dedup_tasks(tasks);
        let keeper = final_tasks.iter().find(|t| t.global_id == "T-001").unwrap();
        assert!(keeper.dependencies.is_empty());
    }
}
