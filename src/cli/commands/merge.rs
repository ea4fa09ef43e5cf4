//! `raven merge` — C6 entry point.

use std::collections::HashMap;

use anyhow::Context;

use crate::cli::artifact::MergeArtifact;
use crate::cli::output::{output, CommandOutput};
use crate::cli::types::MergeArgs;
use crate::domain::models::{EpicBreakdown, EpicTaskResult};
use crate::services::{dag, merger, scatter};

#[derive(Debug, serde::Serialize)]
pub struct MergeOutput {
    pub task_count: usize,
    pub deduplicated: usize,
    pub unresolved_dependencies: usize,
    pub ambiguous_dependencies: usize,
}

impl CommandOutput for MergeOutput {
    fn to_human(&self) -> String {
        format!(
            "{} tasks after merge ({} deduplicated, {} unresolved deps, {} ambiguous deps)",
            self.task_count, self.deduplicated, self.unresolved_dependencies, self.ambiguous_dependencies
        )
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: MergeArgs, json_mode: bool) -> anyhow::Result<()> {
    let breakdown: EpicBreakdown = serde_json::from_slice(&tokio::fs::read(&args.breakdown).await.context("reading breakdown")?)?;

    let mut results: HashMap<String, EpicTaskResult> = HashMap::new();
    let mut epic_titles: HashMap<String, String> = HashMap::new();
    for epic in &breakdown.epics {
        epic_titles.insert(epic.id.clone(), epic.title.clone());
        let path = scatter::derive_output_path(&args.work_dir, &epic.id)
            .with_context(|| format!("epic id {} does not sanitize to a safe filename", epic.id))?;
        let bytes = tokio::fs::read(&path).await.with_context(|| format!("reading {}", path.display()))?;
        let result: EpicTaskResult = serde_json::from_slice(&bytes)?;
        results.insert(epic.id.clone(), result);
    }

    let merge_output = merger::merge(&breakdown, &results).context("merge failed")?;

    // Fail fast on cycles before persisting, mirroring the phase assigner's
    // own precondition.
    dag::validate_and_assign_phases(&merge_output.tasks, &epic_titles).context("dependency graph is invalid")?;
    let depths = dag::compute_depths(&merge_output.tasks);

    let artifact = MergeArtifact { tasks: merge_output.tasks, depths, epic_titles };
    let task_count = artifact.tasks.len();
    artifact.save(&args.output).await.context("writing merge artifact")?;

    output(
        &MergeOutput {
            task_count,
            deduplicated: merge_output.dedup_report.removed_count,
            unresolved_dependencies: merge_output.remap_report.unresolved.len(),
            ambiguous_dependencies: merge_output.remap_report.ambiguous.len(),
        },
        json_mode,
    );
    Ok(())
}
