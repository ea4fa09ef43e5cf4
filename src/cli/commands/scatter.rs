//! `raven scatter` — C5 entry point.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cli::output::{output, CommandOutput};
use crate::cli::types::ScatterArgs;
use crate::domain::models::EpicBreakdown;
use crate::domain::ports::agent::Agent;
use crate::domain::ports::event_sink::EventSink;
use crate::infrastructure::agent::{SubprocessAgent, SubprocessAgentConfig};
use crate::infrastructure::config::RavenConfig;
use crate::infrastructure::rate_limit::RateLimitCoordinator;
use crate::services::scatter::{self, ScatterConfig};
use std::time::Duration;

use super::{EXIT_CANCELLED, EXIT_OK, EXIT_PARTIAL};

#[derive(Debug, serde::Serialize)]
pub struct ScatterOutput {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: bool,
}

impl CommandOutput for ScatterOutput {
    fn to_human(&self) -> String {
        if self.cancelled {
            format!("Cancelled after {} epics succeeded, {} failed", self.succeeded, self.failed)
        } else {
            format!("{} epics succeeded, {} failed", self.succeeded, self.failed)
        }
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: ScatterArgs, config: &RavenConfig, json_mode: bool, cancel: &CancellationToken) -> anyhow::Result<i32> {
    let prd = tokio::fs::read_to_string(&args.prd).await.context("reading PRD")?;
    let breakdown: EpicBreakdown = serde_json::from_slice(&tokio::fs::read(&args.breakdown).await.context("reading breakdown")?)?;
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
    let scatter_config = ScatterConfig { max_retries: config.max_retries, max_concurrency: config.max_concurrency };

    let (tx, rx) = mpsc::channel(256);
    let sink = EventSink::new(tx);
    let logger = super::spawn_event_logger(rx);

    let result = scatter::scatter(
        agent,
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

    // Workers leave whatever the agent last wrote at each epic's output
    // path; re-write it from the validated in-memory result so `merge` can
    // trust the file even when extraction fell back to parsing stdout.
    for task_result in &result.successes {
        if let Some(path) = scatter::derive_output_path(&args.work_dir, &task_result.epic_id) {
            let json = serde_json::to_vec_pretty(task_result)?;
            tokio::fs::write(&path, json).await.with_context(|| format!("writing {}", path.display()))?;
        }
    }

    for failure in &result.failures {
        tracing::warn!(epic_id = %failure.epic_id, error = ?failure.error, "epic scatter failed");
    }

    output(
        &ScatterOutput { succeeded: result.successes.len(), failed: result.failures.len(), cancelled: result.cancelled },
        json_mode,
    );

    if result.cancelled {
        return Ok(EXIT_CANCELLED);
    }
    if !result.failures.is_empty() {
        return Ok(EXIT_PARTIAL);
    }
    Ok(EXIT_OK)
}
