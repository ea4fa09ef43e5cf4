//! `raven decompose` — shred, scatter, merge, and emit as one pipeline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cli::output::{output, CommandOutput};
use crate::cli::types::DecomposeArgs;
use crate::domain::error::ShredError;
use crate::domain::models::EpicTaskResult;
use crate::domain::ports::agent::Agent;
use crate::domain::ports::event_sink::EventSink;
use crate::infrastructure::agent::{SubprocessAgent, SubprocessAgentConfig};
use crate::infrastructure::config::RavenConfig;
use crate::infrastructure::rate_limit::RateLimitCoordinator;
use crate::services::shredder::ShredderConfig;
use crate::services::scatter::{self, ScatterConfig};
use crate::services::{dag, emitter, merger, shredder};

use super::{EXIT_CANCELLED, EXIT_OK, EXIT_PARTIAL};

#[derive(Debug, serde::Serialize)]
pub struct DecomposeOutput {
    pub epic_count: usize,
    pub task_count: usize,
    pub scatter_failures: usize,
    pub output_dir: String,
}

impl CommandOutput for DecomposeOutput {
    fn to_human(&self) -> String {
        format!(
            "{} epics, {} tasks ({} scatter failure(s)) written to {}",
            self.epic_count, self.task_count, self.scatter_failures, self.output_dir
        )
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: DecomposeArgs, config: &RavenConfig, json_mode: bool, cancel: &CancellationToken) -> anyhow::Result<i32> {
    tokio::fs::create_dir_all(&args.work_dir).await?;

    let agent: Arc<dyn Agent> = Arc::new(SubprocessAgent::new(SubprocessAgentConfig {
        binary_path: config.agent_binary_path.clone(),
        extra_args: Vec::new(),
    }));
    let rate_limiter = Arc::new(RateLimitCoordinator::new(
        Duration::from_secs(config.rate_limit_default_wait_secs),
        config.rate_limit_jitter,
        config.rate_limit_max_waits,
    ));

    let shredder_config = ShredderConfig { max_retries: config.max_retries, ..ShredderConfig::default() };
    let breakdown_path = args.work_dir.join("breakdown.json");
    let (tx, rx) = mpsc::channel(256);
    let sink = EventSink::new(tx);
    let logger = super::spawn_event_logger(rx);

    let shred_result = shredder::shred(
        agent.as_ref(),
        &args.prd,
        &breakdown_path,
        &crate::prompts::render_shred_prompt,
        &shredder_config,
        Some(&sink),
        cancel,
    )
    .await;
    drop(sink);
    let _ = logger.await;

    let breakdown = match shred_result {
        Ok(breakdown) => breakdown,
        Err(ShredError::Cancelled) => return Ok(EXIT_CANCELLED),
        Err(e) => return Err(anyhow::anyhow!(e)).context("shred failed"),
    };
    tokio::fs::write(&breakdown_path, serde_json::to_vec_pretty(&breakdown)?).await?;

    let prd = tokio::fs::read_to_string(&args.prd).await.context("reading PRD")?;
    let scatter_config = ScatterConfig { max_retries: config.max_retries, max_concurrency: config.max_concurrency };
    let (tx, rx) = mpsc::channel(256);
    let sink = EventSink::new(tx);
    let logger = super::spawn_event_logger(rx);

    let scatter_output = scatter::scatter(
        agent.clone(),
        &config.agent_binary_path,
        rate_limiter,
        &prd,
        &breakdown,
        &args.work_dir,
        Arc::new(crate::prompts::render_scatter_prompt),
        &scatter_config,
        Some(sink),
        cancel,
    )
    .await;
    let _ = logger.await;

    for failure in &scatter_output.failures {
        tracing::warn!(epic_id = %failure.epic_id, error = ?failure.error, "epic scatter failed");
    }
    if scatter_output.cancelled {
        return Ok(EXIT_CANCELLED);
    }
    if scatter_output.successes.is_empty() {
        anyhow::bail!("all epics failed to scatter");
    }

    let mut results: HashMap<String, EpicTaskResult> = HashMap::new();
    let mut epic_titles: HashMap<String, String> = HashMap::new();
    for epic in &breakdown.epics {
        epic_titles.insert(epic.id.clone(), epic.title.clone());
    }
    for task_result in scatter_output.successes {
        results.insert(task_result.epic_id.clone(), task_result);
    }

    // Epics with no scatter result are dropped from the merge: their tasks
    // simply do not exist yet. `merger::merge` treats a missing entry as
    // zero tasks for that epic.
    let merge_output = merger::merge(&breakdown, &results).context("merge failed")?;
    dag::validate_and_assign_phases(&merge_output.tasks, &epic_titles).context("dependency graph is invalid")?;
    let depths = dag::compute_depths(&merge_output.tasks);

    let (resequenced, old_to_new) = emitter::resequence_ids(merge_output.tasks.clone());
    let remapped_depths: HashMap<String, u32> =
        depths.iter().filter_map(|(old_id, d)| old_to_new.get(old_id).map(|new_id| (new_id.clone(), *d))).collect();
    let phases = dag::assign_phases(&resequenced, &remapped_depths, &epic_titles);

    let emit_result = emitter::emit(merge_output.tasks, &depths, &epic_titles, &args.output_dir, args.force)
        .await
        .context("emit failed")?;

    let catalog = super::loop_cmd::TaskCatalog { tasks: resequenced, phases };
    catalog.save(&args.output_dir.join("catalog.json")).await.context("writing task catalog")?;

    let scatter_failures = scatter_output.failures.len();
    output(
        &DecomposeOutput {
            epic_count: breakdown.epics.len(),
            task_count: emit_result.total_tasks,
            scatter_failures,
            output_dir: emit_result.output_dir.display().to_string(),
        },
        json_mode,
    );

    if scatter_failures > 0 {
        return Ok(EXIT_PARTIAL);
    }
    Ok(EXIT_OK)
}
