//! A concrete `Agent` that shells out to an external AI coding agent CLI.
//!
//! Grounded directly in `adapters/substrates/claude_code.rs`'s
//! `execute_streaming`: spawn with piped stdout/stderr and
//! `kill_on_drop(true)`, pump stdout line-by-line through a `BufReader`,
//! parse each line as JSON first and fall back to plain text, forward
//! through an `mpsc` channel. Generalized from a single CLI's flag set to
//! this spec's prompt/model/effort/allowed-tools/working-dir parameters.

use std::process::Stdio;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::domain::error::AgentError;
use crate::domain::ports::agent::{Agent, AgentRequest, AgentResult, ContentBlock, RateLimitSignal, StreamEvent};

#[derive(Debug, Clone)]
pub struct SubprocessAgentConfig {
    pub binary_path: String,
    pub extra_args: Vec<String>,
}

impl Default for SubprocessAgentConfig {
    fn default() -> Self {
        Self {
            binary_path: "claude".to_string(),
            extra_args: Vec::new(),
        }
    }
}

pub struct SubprocessAgent {
    config: SubprocessAgentConfig,
}

impl SubprocessAgent {
    pub fn new(config: SubprocessAgentConfig) -> Self {
        Self { config }
    }

    fn build_args(&self, request: &AgentRequest) -> Vec<String> {
        let mut args = Vec::new();
        args.push("-p".to_string());
        args.push(request.prompt.clone());
        if !request.model.is_empty() {
            args.push("--model".to_string());
            args.push(request.model.clone());
        }
        if !request.effort.is_empty() {
            args.push("--effort".to_string());
            args.push(request.effort.clone());
        }
        if !request.allowed_tools.is_empty() {
            args.push("--allowed-tools".to_string());
            args.push(request.allowed_tools.join(","));
        }
        args.extend(self.config.extra_args.iter().cloned());
        args
    }

    fn parse_output_line(line: &str) -> StreamEvent {
        match serde_json::from_str::<StreamEvent>(line) {
            Ok(event) => event,
            Err(_) => StreamEvent::Assistant {
                content: vec![ContentBlock::Text { text: line.to_string() }],
            },
        }
    }
}

fn rate_limit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)rate[_-]?limit").unwrap())
}

fn wait_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)retry[_-]?after[=:\s]+(\d+)").unwrap())
}

fn reset_at_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)reset_at[=:\s]+(\S+)").unwrap())
}

fn parse_rate_limit_text(text: &str) -> (Option<RateLimitSignal>, bool) {
    if !rate_limit_re().is_match(text) {
        return (None, false);
    }
    let wait = wait_re()
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .map(Duration::from_secs);
    let reset_at: Option<DateTime<Utc>> = reset_at_re()
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| DateTime::parse_from_rfc3339(m.as_str()).ok())
        .map(|t| t.with_timezone(&Utc));
    (Some(RateLimitSignal { reset_at, wait }), true)
}

#[async_trait]
impl Agent for SubprocessAgent {
    async fn run(
        &self,
        request: &AgentRequest,
        event_tx: Option<mpsc::Sender<StreamEvent>>,
    ) -> Result<AgentResult, AgentError> {
        let args = self.build_args(request);
        let start = Instant::now();

        let mut child = Command::new(&self.config.binary_path)
            .args(&args)
            .current_dir(&request.working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AgentError::SpawnFailed(e.to_string()))?;

        let stdout = child.stdout.take().ok_or_else(|| AgentError::SpawnFailed("no stdout handle".to_string()))?;
        let stderr = child.stderr.take().ok_or_else(|| AgentError::SpawnFailed("no stderr handle".to_string()))?;

        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut captured_stdout = String::new();
        let stdout_task = async {
            while let Ok(Some(line)) = stdout_lines.next_line().await {
                captured_stdout.push_str(&line);
                captured_stdout.push('\n');
                if let Some(tx) = &event_tx {
                    let _ = tx.try_send(Self::parse_output_line(&line));
                }
            }
            captured_stdout
        };

        let mut stderr_lines = BufReader::new(stderr).lines();
        let stderr_task = async {
            let mut captured = String::new();
            while let Ok(Some(line)) = stderr_lines.next_line().await {
                captured.push_str(&line);
                captured.push('\n');
            }
            captured
        };

        let (stdout_text, stderr_text) = tokio::join!(stdout_task, stderr_task);

        let status = child.wait().await.map_err(AgentError::Io)?;
        let duration = start.elapsed();
        let exit_code = status.code().unwrap_or(-1);

        let combined = format!("{stdout_text}\n{stderr_text}");
        let (rate_limit, _) = parse_rate_limit_text(&combined);

        if exit_code != 0 && rate_limit.is_none() {
            return Err(AgentError::AbnormalExit(format!("exit code {exit_code}: {stderr_text}")));
        }

        Ok(AgentResult {
            stdout: stdout_text,
            stderr: stderr_text,
            exit_code,
            duration,
            rate_limit,
        })
    }

    fn parse_rate_limit(&self, text: &str) -> (Option<RateLimitSignal>, bool) {
        parse_rate_limit_text(text)
    }

    fn dry_run_command(&self, request: &AgentRequest) -> String {
        let args = self.build_args(request);
        format!("{} {}", self.config.binary_path, args.join(" "))
    }
}
