//! `raven emit` — C8 entry point.

use anyhow::Context;

use crate::cli::artifact::MergeArtifact;
use crate::cli::output::{output, CommandOutput};
use crate::cli::types::EmitArgs;
use crate::services::{dag, emitter};

#[derive(Debug, serde::Serialize)]
pub struct EmitOutput {
    pub output_dir: String,
    pub total_tasks: usize,
    pub task_files: usize,
}

impl CommandOutput for EmitOutput {
    fn to_human(&self) -> String {
        format!("Wrote {} task(s) ({} files) to {}", self.total_tasks, self.task_files, self.output_dir)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: EmitArgs, json_mode: bool) -> anyhow::Result<()> {
    let artifact = MergeArtifact::load(&args.merged).await.context("reading merge artifact")?;

    // Independently re-derive the final ids/phases so `loop` has a
    // machine-readable view of the same catalog `emit` writes as markdown.
    let (resequenced, old_to_new) = emitter::resequence_ids(artifact.tasks.clone());
    let remapped_depths: std::collections::HashMap<String, u32> = artifact
        .depths
        .iter()
        .filter_map(|(old_id, depth)| old_to_new.get(old_id).map(|new_id| (new_id.clone(), *depth)))
        .collect();
    let phases = dag::assign_phases(&resequenced, &remapped_depths, &artifact.epic_titles);

    let result = emitter::emit(artifact.tasks, &artifact.depths, &artifact.epic_titles, &args.output_dir, args.force)
        .await
        .context("emit failed")?;

    let catalog = super::loop_cmd::TaskCatalog { tasks: resequenced, phases };
    catalog.save(&args.output_dir.join("catalog.json")).await.context("writing task catalog")?;

    output(
        &EmitOutput {
            output_dir: result.output_dir.display().to_string(),
            total_tasks: result.total_tasks,
            task_files: result.task_files.len(),
        },
        json_mode,
    );
    Ok(())
}
