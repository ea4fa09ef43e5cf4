//! C9 — Loop Runner: a single-threaded state machine driving an AI coding
//! agent through one phase's actionable tasks, or through exactly one
//! named task.
//!
//! Iteration shape grounded in `application/loop_executor.rs`'s `run_loop`:
//! an iterate-check-convergence `loop` that `select!`s each pass against a
//! shutdown signal. Ported here as a single async function rather than a
//! goroutine, with the shutdown `broadcast::Receiver` swapped for a
//! `CancellationToken` and convergence generalized from iteration-count /
//! quality-threshold checks to phase/single-task selection and a three-way
//! signal taxonomy. Streaming-event translation reuses the producer/consumer
//! channel pattern from the agent port's `run` contract.

use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::error::{AgentError, LoopError, RateLimitError};
use crate::domain::models::task_state::parse_task_state_file;
use crate::domain::models::{LoopEvent, MergedTask, PhaseInfo, TaskState, TaskStatus};
use crate::domain::ports::agent::{Agent, AgentRequest, AgentResult, ContentBlock, StreamEvent};
use crate::domain::ports::event_sink::{emit, EventSink};
use crate::infrastructure::rate_limit::RateLimitCoordinator;

pub struct LoopConfig {
    pub max_iterations: u32,
    pub sleep_between: Duration,
    pub dry_run: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self { max_iterations: 50, sleep_between: Duration::from_secs(5), dry_run: false }
    }
}

/// Renders the task prompt from the selected task, the phase it belongs to
/// (absent in single-task mode), and the run config.
pub type LoopPromptRenderer = dyn Fn(&MergedTask, Option<&PhaseInfo>, &LoopConfig) -> String + Send + Sync;

#[derive(Debug, Clone, Copy)]
enum Target<'a> {
    Phase(&'a PhaseInfo),
    Single(&'a MergedTask),
}

impl<'a> Target<'a> {
    fn phase(&self) -> Option<&'a PhaseInfo> {
        match self {
            Target::Phase(p) => Some(p),
            Target::Single(_) => None,
        }
    }

    fn lookup(&self, id: &str) -> Option<&'a MergedTask> {
        match self {
            Target::Phase(phase) => phase.tasks.iter().find(|t| t.global_id == id),
            Target::Single(task) => (task.global_id == id).then_some(*task),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LoopSignal {
    PhaseComplete,
    TaskBlocked(String),
    RavenError(String),
}

fn scan_lines(text: &str) -> Option<LoopSignal> {
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("PHASE_COMPLETE") {
            return Some(LoopSignal::PhaseComplete);
        }
        if let Some(rest) = trimmed.strip_prefix("TASK_BLOCKED") {
            return Some(LoopSignal::TaskBlocked(rest.trim().to_string()));
        }
        if let Some(rest) = trimmed.strip_prefix("RAVEN_ERROR") {
            return Some(LoopSignal::RavenError(rest.trim().to_string()));
        }
    }
    None
}

/// Scan plain-text lines first; if nothing matches, fall back to per-line
/// streaming-JSON parsing and scan assistant text blocks the same way.
fn detect_signal(stdout: &str) -> Option<LoopSignal> {
    if let Some(signal) = scan_lines(stdout) {
        return Some(signal);
    }
    for line in stdout.lines() {
        if let Ok(StreamEvent::Assistant { content }) = serde_json::from_str::<StreamEvent>(line) {
            for block in content {
                if let ContentBlock::Text { text } = block {
                    if let Some(signal) = scan_lines(&text) {
                        return Some(signal);
                    }
                }
            }
        }
    }
    None
}

struct StateFile {
    entries: Vec<TaskState>,
}

impl StateFile {
    async fn load(path: &Path) -> Result<Self, LoopError> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Ok(Self { entries: parse_task_state_file(&contents) }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self { entries: Vec::new() }),
            Err(e) => Err(LoopError::Io(e)),
        }
    }

    fn get(&self, id: &str) -> Option<&TaskState> {
        self.entries.iter().find(|e| e.global_id == id)
    }

    fn status_of(&self, id: &str) -> TaskStatus {
        self.get(id).map(|s| s.status).unwrap_or(TaskStatus::NotStarted)
    }

    fn set(&mut self, entry: TaskState) {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.global_id == entry.global_id) {
            *existing = entry;
        } else {
            self.entries.push(entry);
        }
    }

    async fn save(&self, path: &Path) -> Result<(), LoopError> {
        let contents = self.entries.iter().map(TaskState::to_line).collect::<Vec<_>>().join("\n") + "\n";
        let tmp_path = path.with_extension("tmp");
        tokio::fs::write(&tmp_path, contents).await?;
        tokio::fs::rename(&tmp_path, path).await?;
        Ok(())
    }
}

fn select(target: &Target, states: &StateFile) -> Option<String> {
    match target {
        // Single-task mode always re-selects the named task until it
        // reaches a terminal `completed` state; unlike phase mode it is
        // not filtered to `not_started` since a blocked task must still
        // be retried on the next iteration.
        Target::Single(task) => {
            (states.status_of(&task.global_id) != TaskStatus::Completed).then(|| task.global_id.clone())
        }
        Target::Phase(phase) => phase
            .tasks
            .iter()
            .find(|t| {
                states.status_of(&t.global_id) == TaskStatus::NotStarted
                    && t.dependencies.iter().all(|d| states.status_of(d) == TaskStatus::Completed)
            })
            .map(|t| t.global_id.clone()),
    }
}

/// Run the agent with a streaming consumer that translates `StreamEvent`s
/// into loop events as they arrive, exiting once the producer closes the
/// channel.
async fn invoke_with_streaming(
    agent: &dyn Agent,
    request: &AgentRequest,
    task_id: &str,
    event_sink: Option<&EventSink<LoopEvent>>,
) -> Result<AgentResult, AgentError> {
    let (tx, mut rx) = mpsc::channel(256);
    let sink = event_sink.cloned();
    let task_id_owned = task_id.to_string();

    let consumer = tokio::spawn(async move {
        let mut tool_names: std::collections::HashMap<String, String> = std::collections::HashMap::new();
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Assistant { content } => {
                    for block in content {
                        match block {
                            ContentBlock::Text { text } => {
                                emit(sink.as_ref(), LoopEvent::AgentThinking { task_id: task_id_owned.clone(), text });
                            }
                            ContentBlock::ToolUse { id, name, .. } => {
                                tool_names.insert(id, name.clone());
                                emit(sink.as_ref(), LoopEvent::ToolStarted { task_id: task_id_owned.clone(), tool: name });
                            }
                            ContentBlock::ToolResult { .. } => {}
                        }
                    }
                }
                StreamEvent::User { content } => {
                    for block in content {
                        if let ContentBlock::ToolResult { tool_use_id, is_error, .. } = block {
                            let tool = tool_names.get(&tool_use_id).cloned().unwrap_or_default();
                            emit(sink.as_ref(), LoopEvent::ToolCompleted { task_id: task_id_owned.clone(), tool, is_error });
                        }
                    }
                }
                StreamEvent::Result { cost_usd, .. } => {
                    emit(sink.as_ref(), LoopEvent::SessionStats { task_id: task_id_owned.clone(), cost_usd });
                }
                StreamEvent::System { .. } => {}
            }
        }
    });

    let result = agent.run(request, Some(tx)).await;
    let _ = consumer.await;
    result
}

/// Invoke the agent, retrying exactly once if a rate-limit signal is
/// detected either in the structured result or by parsing the combined
/// output text.
async fn invoke_with_rate_limit_retry(
    agent: &dyn Agent,
    agent_name: &str,
    rate_limiter: &RateLimitCoordinator,
    request: &AgentRequest,
    task_id: &str,
    event_sink: Option<&EventSink<LoopEvent>>,
    cancel: &CancellationToken,
) -> Result<AgentResult, LoopError> {
    let result = invoke_with_streaming(agent, request, task_id, event_sink).await?;

    let combined = format!("{}\n{}", result.stdout, result.stderr);
    let (text_signal, found_in_text) = agent.parse_rate_limit(&combined);
    let rate_limited = found_in_text || result.rate_limit.is_some();

    if !rate_limited {
        rate_limiter.clear_rate_limit(agent_name);
        return Ok(result);
    }

    let wait = result.rate_limit.as_ref().and_then(|s| s.wait).or_else(|| text_signal.and_then(|s| s.wait));
    rate_limiter.record_rate_limit(agent_name, wait);
    emit(event_sink, LoopEvent::RateLimitWait { task_id: task_id.to_string() });

    match rate_limiter.wait_for_reset(agent_name, cancel).await {
        Ok(()) => {
            emit(event_sink, LoopEvent::RateLimitResume { task_id: task_id.to_string() });
            let retried = invoke_with_streaming(agent, request, task_id, event_sink).await?;
            rate_limiter.clear_rate_limit(agent_name);
            Ok(retried)
        }
        Err(RateLimitError::MaxWaitsExceeded) => {
            emit(event_sink, LoopEvent::LoopAborted { reason: "rate limit max-waits exceeded".to_string() });
            Err(LoopError::RateLimitExhausted)
        }
        Err(RateLimitError::Cancelled) => {
            emit(event_sink, LoopEvent::LoopAborted { reason: "cancelled".to_string() });
            Err(LoopError::Cancelled)
        }
    }
}

fn completed_state(id: &str, agent_name: &str, states: &StateFile) -> TaskState {
    let existing = states.get(id);
    TaskState {
        global_id: id.to_string(),
        status: TaskStatus::Completed,
        agent: agent_name.to_string(),
        start_time: existing.and_then(|s| s.start_time),
        end_time: Some(Utc::now()),
    }
}

fn blocked_state(id: &str, states: &StateFile) -> TaskState {
    let existing = states.get(id).cloned();
    TaskState {
        global_id: id.to_string(),
        status: TaskStatus::Blocked,
        agent: existing.as_ref().map(|s| s.agent.clone()).unwrap_or_default(),
        start_time: existing.as_ref().and_then(|s| s.start_time),
        end_time: None,
    }
}

#[allow(clippy::too_many_arguments)]
async fn run(
    agent: &dyn Agent,
    agent_name: &str,
    rate_limiter: &RateLimitCoordinator,
    target: Target<'_>,
    state_path: &Path,
    work_dir: &Path,
    render_prompt: &LoopPromptRenderer,
    config: &LoopConfig,
    event_sink: Option<&EventSink<LoopEvent>>,
    cancel: &CancellationToken,
) -> Result<(), LoopError> {
    let mut states = StateFile::load(state_path).await?;
    let mut stale_ring: VecDeque<String> = VecDeque::with_capacity(3);

    for _ in 1..=config.max_iterations {
        if cancel.is_cancelled() {
            emit(event_sink, LoopEvent::LoopAborted { reason: "cancelled".to_string() });
            return Err(LoopError::Cancelled);
        }

        let Some(task_id) = select(&target, &states) else {
            if matches!(target, Target::Phase(_)) {
                emit(event_sink, LoopEvent::PhaseComplete);
            }
            return Ok(());
        };

        stale_ring.push_back(task_id.clone());
        if stale_ring.len() > 3 {
            stale_ring.pop_front();
        }
        if stale_ring.len() == 3 && stale_ring.iter().all(|id| id == &task_id) {
            emit(event_sink, LoopEvent::StaleSelection { task_id: task_id.clone() });
        }

        let task = target.lookup(&task_id).expect("selected id must belong to the target's task set");

        states.set(TaskState {
            global_id: task_id.clone(),
            status: TaskStatus::InProgress,
            agent: agent_name.to_string(),
            start_time: Some(Utc::now()),
            end_time: None,
        });
        states.save(state_path).await?;

        let prompt = render_prompt(task, target.phase(), config);

        if config.dry_run {
            let request = AgentRequest::new(prompt, work_dir);
            let command = agent.dry_run_command(&request);
            eprintln!("{command}");
            emit(event_sink, LoopEvent::DryRun { task_id: task_id.clone(), command });
            states.set(TaskState::not_started(task_id.clone()));
            states.save(state_path).await?;
            continue;
        }

        let request = AgentRequest::new(prompt, work_dir);
        emit(event_sink, LoopEvent::AgentStarted { task_id: task_id.clone() });
        let result = invoke_with_rate_limit_retry(agent, agent_name, rate_limiter, &request, &task_id, event_sink, cancel).await?;

        match detect_signal(&result.stdout) {
            Some(LoopSignal::PhaseComplete) => {
                states.set(completed_state(&task_id, agent_name, &states));
                states.save(state_path).await?;
                emit(event_sink, LoopEvent::TaskCompleted { task_id: task_id.clone() });
                emit(event_sink, LoopEvent::PhaseComplete);
                return Ok(());
            }
            Some(LoopSignal::TaskBlocked(detail)) => {
                states.set(blocked_state(&task_id, &states));
                states.save(state_path).await?;
                emit(event_sink, LoopEvent::TaskBlocked { task_id: task_id.clone(), detail });
            }
            Some(LoopSignal::RavenError(detail)) => {
                return Err(LoopError::AgentReportedError(detail));
            }
            None => {
                states.set(completed_state(&task_id, agent_name, &states));
                states.save(state_path).await?;
                emit(event_sink, LoopEvent::TaskCompleted { task_id: task_id.clone() });

                if matches!(target, Target::Phase(_)) && select(&target, &states).is_none() {
                    emit(event_sink, LoopEvent::PhaseComplete);
                    return Ok(());
                }
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(config.sleep_between) => {}
            _ = cancel.cancelled() => {
                emit(event_sink, LoopEvent::LoopAborted { reason: "cancelled".to_string() });
                return Err(LoopError::Cancelled);
            }
        }
    }

    emit(event_sink, LoopEvent::MaxIterations { limit: config.max_iterations });
    Err(LoopError::MaxIterationsExceeded(config.max_iterations))
}

/// Process all actionable tasks of `phase` until completion, error, or the
/// iteration limit.
#[allow(clippy::too_many_arguments)]
pub async fn run_phase(
    agent: &dyn Agent,
    agent_name: &str,
    rate_limiter: &RateLimitCoordinator,
    phase: &PhaseInfo,
    state_path: &Path,
    work_dir: &Path,
    render_prompt: &LoopPromptRenderer,
    config: &LoopConfig,
    event_sink: Option<&EventSink<LoopEvent>>,
    cancel: &CancellationToken,
) -> Result<(), LoopError> {
    run(agent, agent_name, rate_limiter, Target::Phase(phase), state_path, work_dir, render_prompt, config, event_sink, cancel).await
}

/// Process exactly one named task.
#[allow(clippy::too_many_arguments)]
pub async fn run_single_task(
    agent: &dyn Agent,
    agent_name: &str,
    rate_limiter: &RateLimitCoordinator,
    task: &MergedTask,
    state_path: &Path,
    work_dir: &Path,
    render_prompt: &LoopPromptRenderer,
    config: &LoopConfig,
    event_sink: Option<&EventSink<LoopEvent>>,
    cancel: &CancellationToken,
) -> Result<(), LoopError> {
    run(agent, agent_name, rate_limiter, Target::Single(task), state_path, work_dir, render_prompt, config, event_sink, cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Effort, Priority};
    use crate::infrastructure::agent::MockAgent;
    use crate::domain::ports::agent::RateLimitSignal;
    use tempfile::tempdir;

    fn task(id: &str, deps: Vec<&str>) -> MergedTask {
        MergedTask {
            global_id: id.to_string(),
            temp_id: "E001-T01".to_string(),
            epic_id: "E-001".to_string(),
            title: "Do thing".to_string(),
            description: "d".to_string(),
            acceptance_criteria: vec!["works".to_string()],
            dependencies: deps.into_iter().map(String::from).collect(),
            effort: Effort::Small,
            priority: Priority::MustHave,
        }
    }

    fn noop_prompt(_task: &MergedTask, _phase: Option<&PhaseInfo>, _config: &LoopConfig) -> String {
        "do the task".to_string()
    }

    fn agent_result(stdout: impl Into<String>, rate_limit: Option<RateLimitSignal>) -> Result<AgentResult, AgentError> {
        Ok(AgentResult {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
            duration: Duration::from_millis(1),
            rate_limit,
        })
    }

    #[test]
    fn signal_detection_returns_first_match_in_plain_text() {
        let stdout = "TASK_BLOCKED waiting on T-001\nPHASE_COMPLETE\n";
        let signal = detect_signal(stdout);
        assert_eq!(signal, Some(LoopSignal::TaskBlocked("waiting on T-001".to_string())));
    }

    #[test]
    fn signal_detection_falls_back_to_streaming_json() {
        let event = StreamEvent::Assistant { content: vec![ContentBlock::Text { text: "RAVEN_ERROR disk full".to_string() }] };
        let line = serde_json::to_string(&event).unwrap();
        let signal = detect_signal(&line);
        assert_eq!(signal, Some(LoopSignal::RavenError("disk full".to_string())));
    }

    #[tokio::test]
    async fn single_task_completes_on_no_signal() {
        let dir = tempdir().unwrap();
        let state_path = dir.path().join("task-state.conf");
        let the_task = task("T-001", vec![]);

        let agent = MockAgent::new(vec![agent_result("all done, no markers here", None)]);
        let rate_limiter = RateLimitCoordinator::new(Duration::from_millis(1), 0.0, 5);
        let config = LoopConfig { max_iterations: 5, sleep_between: Duration::from_millis(1), dry_run: false };
        let cancel = CancellationToken::new();

        run_single_task(&agent, "claude", &rate_limiter, &the_task, &state_path, dir.path(), &noop_prompt, &config, None, &cancel)
            .await
            .unwrap();

        let contents = tokio::fs::read_to_string(&state_path).await.unwrap();
        let states = parse_task_state_file(&contents);
        assert_eq!(states[0].status, TaskStatus::Completed);
        assert_eq!(agent.call_count(), 1);
    }

    #[tokio::test]
    async fn rate_limited_response_retries_exactly_once() {
        let dir = tempdir().unwrap();
        let state_path = dir.path().join("task-state.conf");
        let the_task = task("T-001", vec![]);

        let agent = MockAgent::new(vec![
            agent_result("throttled", Some(RateLimitSignal { reset_at: None, wait: Some(Duration::from_millis(1)) })),
            agent_result("done now", None),
        ]);
        let rate_limiter = RateLimitCoordinator::new(Duration::from_millis(1), 0.0, 5);
        let config = LoopConfig { max_iterations: 5, sleep_between: Duration::from_millis(1), dry_run: false };
        let cancel = CancellationToken::new();

        run_single_task(&agent, "claude", &rate_limiter, &the_task, &state_path, dir.path(), &noop_prompt, &config, None, &cancel)
            .await
            .unwrap();

        assert_eq!(agent.call_count(), 2);
    }

    #[tokio::test]
    async fn exhausts_at_max_iterations_when_always_blocked() {
        let dir = tempdir().unwrap();
        let state_path = dir.path().join("task-state.conf");
        let the_task = task("T-001", vec![]);

        let agent = MockAgent::new(vec![agent_result("TASK_BLOCKED still waiting", None)]);
        let rate_limiter = RateLimitCoordinator::new(Duration::from_millis(1), 0.0, 5);
        let config = LoopConfig { max_iterations: 3, sleep_between: Duration::from_millis(1), dry_run: false };
        let cancel = CancellationToken::new();

        let err = run_single_task(&agent, "claude", &rate_limiter, &the_task, &state_path, dir.path(), &noop_prompt, &config, None, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, LoopError::MaxIterationsExceeded(3)));
        assert_eq!(agent.call_count(), 3);
    }

    #[tokio::test]
    async fn dry_run_never_invokes_the_agent_and_reverts_state() {
        let dir = tempdir().unwrap();
        let state_path = dir.path().join("task-state.conf");
        let the_task = task("T-001", vec![]);

        let agent = MockAgent::always_invalid();
        let rate_limiter = RateLimitCoordinator::new(Duration::from_millis(1), 0.0, 5);
        let config = LoopConfig { max_iterations: 1, sleep_between: Duration::from_millis(1), dry_run: true };
        let cancel = CancellationToken::new();

        let err = run_single_task(&agent, "claude", &rate_limiter, &the_task, &state_path, dir.path(), &noop_prompt, &config, None, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, LoopError::MaxIterationsExceeded(1)));
        assert_eq!(agent.call_count(), 0);

        let contents = tokio::fs::read_to_string(&state_path).await.unwrap();
        let states = parse_task_state_file(&contents);
        assert_eq!(states[0].status, TaskStatus::NotStarted);
    }

    #[tokio::test]
    async fn phase_mode_early_exits_once_no_tasks_remain_actionable() {
        let dir = tempdir().unwrap();
        let state_path = dir.path().join("task-state.conf");
        let phase = PhaseInfo {
            id: 1,
            name: "Phase 1".to_string(),
            start_task: "T-001".to_string(),
            end_task: "T-002".to_string(),
            tasks: vec![task("T-001", vec![]), task("T-002", vec![])],
        };

        let agent = MockAgent::new(vec![agent_result("finished", None), agent_result("finished", None)]);
        let rate_limiter = RateLimitCoordinator::new(Duration::from_millis(1), 0.0, 5);
        let config = LoopConfig { max_iterations: 10, sleep_between: Duration::from_millis(1), dry_run: false };
        let cancel = CancellationToken::new();

        run_phase(&agent, "claude", &rate_limiter, &phase, &state_path, dir.path(), &noop_prompt, &config, None, &cancel)
            .await
            .unwrap();

        assert_eq!(agent.call_count(), 2);
        let contents = tokio::fs::read_to_string(&state_path).await.unwrap();
        let states = parse_task_state_file(&contents);
        assert!(states.iter().all(|s| s.status == TaskStatus::Completed));
    }
}
