//! `raven shred` — C4 entry point.

use anyhow::Context;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cli::output::{output, CommandOutput};
use crate::cli::types::ShredArgs;
use crate::domain::ports::event_sink::EventSink;
use crate::infrastructure::agent::{SubprocessAgent, SubprocessAgentConfig};
use crate::infrastructure::config::RavenConfig;
use crate::domain::error::ShredError;
use crate::services::shredder::{self, ShredderConfig};

use super::{EXIT_CANCELLED, EXIT_OK};

#[derive(Debug, serde::Serialize)]
pub struct ShredOutput {
    pub output_path: String,
    pub epic_count: usize,
}

impl CommandOutput for ShredOutput {
    fn to_human(&self) -> String {
        format!("Wrote {} epics to {}", self.epic_count, self.output_path)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: ShredArgs, config: &RavenConfig, json_mode: bool, cancel: &CancellationToken) -> anyhow::Result<i32> {
    let agent = SubprocessAgent::new(SubprocessAgentConfig {
        binary_path: config.agent_binary_path.clone(),
        extra_args: Vec::new(),
    });
    let shredder_config = ShredderConfig { max_retries: config.max_retries, ..ShredderConfig::default() };

    let (tx, rx) = mpsc::channel(64);
    let sink = EventSink::new(tx);
    let logger = super::spawn_event_logger(rx);

    let result = shredder::shred(&agent, &args.prd, &args.output, &crate::prompts::render_shred_prompt, &shredder_config, Some(&sink), cancel).await;

    drop(sink);
    let _ = logger.await;

    let breakdown = match result {
        Ok(breakdown) => breakdown,
        Err(ShredError::Cancelled) => return Ok(EXIT_CANCELLED),
        Err(e) => return Err(anyhow::anyhow!(e)).context("shred failed"),
    };

    // The agent is instructed to write `args.output` itself; re-write it
    // from the validated in-memory result so the artifact is authoritative
    // even when extraction fell back to parsing stdout.
    let json = serde_json::to_vec_pretty(&breakdown)?;
    tokio::fs::write(&args.output, json).await.context("writing epic breakdown")?;

    output(
        &ShredOutput { output_path: args.output.display().to_string(), epic_count: breakdown.epics.len() },
        json_mode,
    );
    Ok(EXIT_OK)
}
