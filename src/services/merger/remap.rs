//! C6.3 — Dependency remapping from temp-ids to global ids.

use std::collections::HashMap;

use super::assign::PendingDeps;
use crate::domain::models::{EpicTaskResult, MergedTask};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedRef {
    pub task_global_id: String,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbiguousRef {
    pub task_global_id: String,
    pub reference: String,
    pub candidates: Vec<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RemapReport {
    pub resolved: usize,
    pub unresolved: Vec<UnresolvedRef>,
    pub ambiguous: Vec<AmbiguousRef>,
}

fn normalize_for_match(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_lowercase()
}

/// Resolve every task's `local_dependencies` and `cross_epic_dependencies`
/// into a single deduplicated list of global ids. Does not mutate the input
/// slice; returns a fresh `Vec<MergedTask>`.
pub fn remap_dependencies(
    tasks: &[MergedTask],
    pending: &HashMap<String, PendingDeps>,
    temp_id_to_global: &HashMap<String, String>,
    results: &HashMap<String, EpicTaskResult>,
) -> (Vec<MergedTask>, RemapReport) {
    let mut report = RemapReport::default();
    let empty = PendingDeps::default();
    let mut out = Vec::with_capacity(tasks.len());

    for task in tasks {
        let pd = pending.get(&task.global_id).unwrap_or(&empty);
        let mut deps: Vec<String> = Vec::new();

        for local in &pd.local {
            match temp_id_to_global.get(local) {
                None => report.unresolved.push(UnresolvedRef {
                    task_global_id: task.global_id.clone(),
                    reference: local.clone(),
                }),
                Some(global_id) => {
                    if global_id == &task.global_id {
                        continue;
                    }
                    if !deps.contains(global_id) {
                        deps.push(global_id.clone());
                    }
                    report.resolved += 1;
                }
            }
        }

        for cross in &pd.cross {
            let Some((epic_part, label)) = cross.split_once(':') else {
                report.unresolved.push(UnresolvedRef {
                    task_global_id: task.global_id.clone(),
                    reference: cross.clone(),
                });
                continue;
            };

            let Some(epic_result) = results.get(epic_part) else {
                report.unresolved.push(UnresolvedRef {
                    task_global_id: task.global_id.clone(),
                    reference: cross.clone(),
                });
                continue;
            };

            let normalized_label = normalize_for_match(label);
            let candidates: Vec<String> = epic_result
                .tasks
                .iter()
                .filter(|candidate| {
                    let normalized_title = normalize_for_match(&candidate.title);
                    normalized_title == normalized_label || normalized_title.contains(&normalized_label)
                })
                .filter_map(|candidate| temp_id_to_global.get(&candidate.temp_id).cloned())
                .collect();

            match candidates.len() {
                0 => report.unresolved.push(UnresolvedRef {
                    task_global_id: task.global_id.clone(),
                    reference: cross.clone(),
                }),
                1 => {
                    let global_id = &candidates[0];
                    if global_id != &task.global_id {
                        if !deps.contains(global_id) {
                            deps.push(global_id.clone());
                        }
                        report.resolved += 1;
                    }
                }
                _ => {
                    report.ambiguous.push(AmbiguousRef {
                        task_global_id: task.global_id.clone(),
                        reference: cross.clone(),
                        candidates: candidates.clone(),
                    });
                    let global_id = &candidates[0];
                    if global_id != &task.global_id && !deps.contains(global_id) {
                        deps.push(global_id.clone());
                    }
                }
            }
        }

        let mut merged = task.clone();
        merged.dependencies = deps;
        out.push(merged);
    }

    (out, report)
}
