//! C3 — Agent Interface.
//!
//! A single polymorphic contract for an external AI coding agent: run a
//! prompt, return stdout/stderr/exit/duration, and separately parse
//! rate-limit signals out of a text blob. Modeled after the port/adapter
//! split in `domain/ports/llm_substrate.rs` (trait `LlmSubstrate`) and the
//! subprocess plumbing of `adapters/substrates/claude_code.rs`, generalized
//! from a single CLI's flag set to the prompt/model/effort/allowed-tools/
//! working-dir parameters this spec calls for.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::domain::error::AgentError;

/// A discrete streaming event emitted while the agent runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StreamEvent {
    /// Assistant turn: text and/or tool-use content blocks.
    Assistant { content: Vec<ContentBlock> },
    /// Tool-result content supplied back to the assistant.
    User { content: Vec<ContentBlock> },
    /// Final turn summary: cost and token totals.
    Result { cost_usd: f64, input_tokens: u64, output_tokens: u64 },
    /// System-level informational event.
    System { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: serde_json::Value },
    ToolResult { tool_use_id: String, content: String, is_error: bool },
}

/// Parameters for one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub prompt: String,
    pub model: String,
    pub effort: String,
    pub allowed_tools: Vec<String>,
    pub working_dir: PathBuf,
}

impl AgentRequest {
    pub fn new(prompt: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            prompt: prompt.into(),
            model: String::new(),
            effort: String::new(),
            allowed_tools: Vec::new(),
            working_dir: working_dir.into(),
        }
    }
}

/// A parsed rate-limit signal: the agent reported it is currently throttled
/// and suggests waiting until (at least) `reset_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitSignal {
    pub reset_at: Option<DateTime<Utc>>,
    pub wait: Option<Duration>,
}

/// Outcome of one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
    pub rate_limit: Option<RateLimitSignal>,
}

impl AgentResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Port trait for an external AI coding agent.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` for concurrent use by scatter
/// workers.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Run the agent against `request`, optionally streaming events to
    /// `event_tx` as they are produced. The caller owns `event_tx` and
    /// drains it after this call returns; the callee closes its sending
    /// half by dropping it when the subprocess exits.
    async fn run(
        &self,
        request: &AgentRequest,
        event_tx: Option<mpsc::Sender<StreamEvent>>,
    ) -> Result<AgentResult, AgentError>;

    /// Inspect a text blob (typically agent stdout) for a rate-limit signal.
    /// Returns the parsed signal (if any) and whether one was found.
    fn parse_rate_limit(&self, text: &str) -> (Option<RateLimitSignal>, bool);

    /// The command line this agent would execute for `request`, for
    /// dry-run display. Never actually spawns a process.
    fn dry_run_command(&self, request: &AgentRequest) -> String;
}
