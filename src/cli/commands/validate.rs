//! `raven validate` — C7 entry point, run standalone for CI / pre-flight checks.

use anyhow::Context;

use crate::cli::artifact::MergeArtifact;
use crate::cli::output::{output, CommandOutput};
use crate::cli::types::ValidateArgs;
use crate::services::dag;

#[derive(Debug, serde::Serialize)]
pub struct ValidateOutput {
    pub task_count: usize,
    pub phase_count: usize,
}

impl CommandOutput for ValidateOutput {
    fn to_human(&self) -> String {
        format!("Valid: {} task(s) across {} phase(s)", self.task_count, self.phase_count)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: ValidateArgs, json_mode: bool) -> anyhow::Result<()> {
    let artifact = MergeArtifact::load(&args.merged).await.context("reading merge artifact")?;
    let phases = dag::validate_and_assign_phases(&artifact.tasks, &artifact.epic_titles).map_err(|e| anyhow::anyhow!("{e}"))?;

    output(&ValidateOutput { task_count: artifact.tasks.len(), phase_count: phases.len() }, json_mode);
    Ok(())
}
