//! `raven loop` — C9 entry point, phase mode and single-task mode.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cli::output::{output, CommandOutput};
use crate::cli::types::LoopMode;
use crate::domain::error::LoopError;
use crate::domain::models::{MergedTask, PhaseInfo};
use crate::domain::ports::event_sink::EventSink;
use crate::infrastructure::agent::{SubprocessAgent, SubprocessAgentConfig};
use crate::infrastructure::config::RavenConfig;
use crate::infrastructure::rate_limit::RateLimitCoordinator;
use crate::services::loop_runner::{self, LoopConfig};

use super::{EXIT_CANCELLED, EXIT_OK, EXIT_PARTIAL};

/// The structural task catalog `emit` writes alongside its markdown
/// artifacts, read back here so phase/task lookups don't require
/// re-parsing markdown. `task-state.conf` remains the single mutable
/// progress file the loop runner writes to.
#[derive(Debug, Serialize, Deserialize)]
pub struct TaskCatalog {
    pub tasks: Vec<MergedTask>,
    pub phases: Vec<PhaseInfo>,
}

impl TaskCatalog {
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

#[derive(Debug, serde::Serialize)]
pub struct LoopOutput {
    pub outcome: String,
}

impl CommandOutput for LoopOutput {
    fn to_human(&self) -> String {
        self.outcome.clone()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(mode: LoopMode, config: &RavenConfig, json_mode: bool, cancel: &CancellationToken) -> anyhow::Result<i32> {
    let agent = SubprocessAgent::new(SubprocessAgentConfig {
        binary_path: config.agent_binary_path.clone(),
        extra_args: Vec::new(),
    });
    let rate_limiter = RateLimitCoordinator::new(
        Duration::from_secs(config.rate_limit_default_wait_secs),
        config.rate_limit_jitter,
        config.rate_limit_max_waits,
    );

    let (tx, rx) = mpsc::channel(256);
    let sink = EventSink::new(tx);
    let logger = super::spawn_event_logger(rx);

    let result = match mode {
        LoopMode::Phase { catalog_dir, phase_id, dry_run } => {
            let catalog = TaskCatalog::load(&catalog_dir.join("catalog.json")).await.context("reading task catalog")?;
            let phase = catalog
                .phases
                .iter()
                .find(|p| p.id == phase_id)
                .with_context(|| format!("no phase {phase_id} in catalog"))?;
            let loop_config = LoopConfig { max_iterations: config.loop_max_iterations, sleep_between: Duration::from_secs(config.loop_sleep_between_secs), dry_run };

            loop_runner::run_phase(
                &agent,
                &config.agent_binary_path,
                &rate_limiter,
                phase,
                &catalog_dir.join("task-state.conf"),
                &catalog_dir,
                &crate::prompts::render_loop_prompt,
                &loop_config,
                Some(&sink),
                cancel,
            )
            .await
        }
        LoopMode::Task { catalog_dir, task_id, dry_run } => {
            let catalog = TaskCatalog::load(&catalog_dir.join("catalog.json")).await.context("reading task catalog")?;
            let task = catalog.tasks.iter().find(|t| t.global_id == task_id).with_context(|| format!("no task {task_id} in catalog"))?;
            let loop_config = LoopConfig { max_iterations: config.loop_max_iterations, sleep_between: Duration::from_secs(config.loop_sleep_between_secs), dry_run };

            loop_runner::run_single_task(
                &agent,
                &config.agent_binary_path,
                &rate_limiter,
                task,
                &catalog_dir.join("task-state.conf"),
                &catalog_dir,
                &crate::prompts::render_loop_prompt,
                &loop_config,
                Some(&sink),
                cancel,
            )
            .await
        }
    };

    drop(sink);
    let _ = logger.await;

    let outcome = match &result {
        Ok(()) => "completed".to_string(),
        Err(e) => format!("stopped: {e}"),
    };
    output(&LoopOutput { outcome }, json_mode);

    match result {
        Ok(()) => Ok(EXIT_OK),
        Err(LoopError::Cancelled) => Ok(EXIT_CANCELLED),
        Err(e @ (LoopError::MaxIterationsExceeded(_) | LoopError::RateLimitExhausted)) => {
            tracing::warn!(error = %e, "loop stopped early");
            Ok(EXIT_PARTIAL)
        }
        Err(e) => Err(anyhow::anyhow!(e)),
    }
}
