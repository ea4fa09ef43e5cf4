//! C5 — Scatter Orchestrator: one bounded-concurrency worker per epic,
//! each running the §4.4-shaped retry loop against its own slice of the
//! PRD and consulting a shared rate-limit coordinator between attempts.
//!
//! Worker-pool shape grounded in `services/dag_executor.rs`'s `execute_wave`:
//! a `Semaphore::new(self.config.max_concurrency)` gating a `Vec` of spawned
//! handles collected back into one result list, applied here over epics
//! instead of DAG waves, with a mutex-protected results vector standing in
//! for the join-all. Per-worker retry loop reuses the shredder's structure
//! but adds the rate-limit consultation this component requires.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::domain::error::{AgentError, FieldError, RateLimitError};
use crate::domain::models::{Epic, EpicBreakdown, EpicTaskResult, ScatterEvent};
use crate::domain::ports::agent::{Agent, AgentRequest};
use crate::domain::ports::event_sink::{emit, EventSink};
use crate::infrastructure::rate_limit::RateLimitCoordinator;
use crate::services::validator;

pub struct ScatterConfig {
    pub max_retries: u32,
    pub max_concurrency: usize,
}

impl Default for ScatterConfig {
    fn default() -> Self {
        Self { max_retries: 3, max_concurrency: 3 }
    }
}

/// Renders the scatter prompt from the PRD text, this worker's epic, the
/// other epics (for cross-epic context), the target output path, and a
/// numbered prior-error list.
pub type ScatterPromptRenderer = dyn Fn(&str, &Epic, &[&Epic], &Path, &str) -> String + Send + Sync;

#[derive(Debug, Clone)]
pub struct ScatterFailure {
    pub epic_id: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ScatterOutput {
    pub successes: Vec<EpicTaskResult>,
    pub failures: Vec<ScatterFailure>,
    pub cancelled: bool,
}

/// Keep only `[A-Za-z0-9_-]`; an all-stripped result is rejected.
pub(crate) fn sanitize_epic_id(epic_id: &str) -> Option<String> {
    let sanitized: String = epic_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if sanitized.is_empty() {
        None
    } else {
        Some(sanitized)
    }
}

pub(crate) fn derive_output_path(work_dir: &Path, epic_id: &str) -> Option<PathBuf> {
    let sanitized = sanitize_epic_id(epic_id)?;
    let path = work_dir.join(format!("epic-{sanitized}.json"));
    if path.parent() == Some(work_dir) {
        Some(path)
    } else {
        None
    }
}

fn synthetic_parse_error() -> Vec<FieldError> {
    vec![FieldError {
        field_path: "output".to_string(),
        message: "agent output did not contain parseable JSON".to_string(),
    }]
}

async fn extract_task_result(output_path: &Path, stdout: &str) -> Option<EpicTaskResult> {
    if let Ok(contents) = tokio::fs::read(output_path).await {
        if !contents.is_empty() {
            if let Ok(result) = validator::parse_json_capped::<EpicTaskResult>(&contents) {
                return Some(result);
            }
        }
    }
    let start = stdout.find('{')?;
    let end = stdout.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&stdout[start..=end]).ok()
}

#[allow(clippy::too_many_arguments)]
async fn run_worker(
    agent: &dyn Agent,
    agent_name: &str,
    rate_limiter: &RateLimitCoordinator,
    prd: &str,
    epic: &Epic,
    other_epics: &[&Epic],
    known_epic_ids: &HashSet<&str>,
    work_dir: &Path,
    render_prompt: &ScatterPromptRenderer,
    max_retries: u32,
    event_sink: Option<&EventSink<ScatterEvent>>,
    cancel: &CancellationToken,
) -> Result<EpicTaskResult, ScatterFailure> {
    let fail = |error: &str| ScatterFailure { epic_id: epic.id.clone(), error: Some(error.to_string()) };

    let output_path = derive_output_path(work_dir, &epic.id)
        .ok_or_else(|| fail(&format!("epic id '{}' sanitizes to an empty or unsafe path", epic.id)))?;

    emit(event_sink, ScatterEvent::WorkerStarted { epic_id: epic.id.clone() });

    let mut previous_errors: Vec<FieldError> = Vec::new();
    let mut attempt: u32 = 1;

    loop {
        if attempt > max_retries + 1 {
            emit(event_sink, ScatterEvent::WorkerFailed { epic_id: epic.id.clone() });
            return Err(ScatterFailure { epic_id: epic.id.clone(), error: None });
        }

        if cancel.is_cancelled() {
            emit(event_sink, ScatterEvent::WorkerFailed { epic_id: epic.id.clone() });
            return Err(fail("cancelled"));
        }

        if rate_limiter.should_wait(agent_name).is_some() {
            emit(event_sink, ScatterEvent::RateLimited { epic_id: epic.id.clone() });
            match rate_limiter.wait_for_reset(agent_name, cancel).await {
                Ok(()) => {}
                Err(RateLimitError::MaxWaitsExceeded) => {
                    emit(event_sink, ScatterEvent::WorkerFailed { epic_id: epic.id.clone() });
                    return Err(fail("rate limit max-waits exceeded"));
                }
                Err(RateLimitError::Cancelled) => {
                    emit(event_sink, ScatterEvent::WorkerFailed { epic_id: epic.id.clone() });
                    return Err(fail("cancelled"));
                }
            }
        }

        if attempt > 1 {
            emit(event_sink, ScatterEvent::WorkerRetry { epic_id: epic.id.clone(), attempt });
            let _ = tokio::fs::remove_file(&output_path).await;
        }

        let error_text = validator::format_errors_numbered(&previous_errors);
        let prompt = render_prompt(prd, epic, other_epics, &output_path, &error_text);
        let request = AgentRequest::new(prompt, work_dir);

        let result = match agent.run(&request, None).await {
            Ok(r) => r,
            Err(AgentError::Cancelled) => {
                emit(event_sink, ScatterEvent::WorkerFailed { epic_id: epic.id.clone() });
                return Err(fail("cancelled"));
            }
            Err(e) => {
                emit(event_sink, ScatterEvent::WorkerFailed { epic_id: epic.id.clone() });
                return Err(fail(&e.to_string()));
            }
        };

        let combined = format!("{}\n{}", result.stdout, result.stderr);
        let (signal, found) = agent.parse_rate_limit(&combined);
        if found {
            rate_limiter.record_rate_limit(agent_name, signal.and_then(|s| s.wait));
            emit(event_sink, ScatterEvent::RateLimited { epic_id: epic.id.clone() });
            continue;
        }
        rate_limiter.clear_rate_limit(agent_name);

        let task_result = match extract_task_result(&output_path, &result.stdout).await {
            Some(r) => r,
            None => {
                previous_errors = synthetic_parse_error();
                attempt += 1;
                continue;
            }
        };

        let errors = validator::validate_epic_task_result(&task_result, known_epic_ids);
        if errors.is_empty() {
            emit(event_sink, ScatterEvent::WorkerSucceeded { epic_id: epic.id.clone() });
            return Ok(task_result);
        }

        previous_errors = errors;
        attempt += 1;
    }
}

/// Run one worker per epic, bounded to `config.max_concurrency` running at
/// once, sharing `rate_limiter`. A single worker's exhaustion or error is
/// recorded as a failure and never cancels its siblings.
#[allow(clippy::too_many_arguments)]
pub async fn scatter(
    agent: Arc<dyn Agent>,
    agent_name: &str,
    rate_limiter: Arc<RateLimitCoordinator>,
    prd: &str,
    breakdown: &EpicBreakdown,
    work_dir: &Path,
    render_prompt: Arc<ScatterPromptRenderer>,
    config: &ScatterConfig,
    event_sink: Option<EventSink<ScatterEvent>>,
    cancel: &CancellationToken,
) -> ScatterOutput {
    let known_epic_ids: HashSet<&str> = breakdown.epic_ids();
    let semaphore = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
    let successes = Arc::new(Mutex::new(Vec::new()));
    let failures = Arc::new(Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for epic in &breakdown.epics {
        let epic = epic.clone();
        let other_epics: Vec<Epic> = breakdown.epics.iter().filter(|e| e.id != epic.id).cloned().collect();
        let known_epic_ids_owned: HashSet<String> = known_epic_ids.iter().map(|s| s.to_string()).collect();

        let agent = agent.clone();
        let agent_name = agent_name.to_string();
        let rate_limiter = rate_limiter.clone();
        let prd = prd.to_string();
        let work_dir = work_dir.to_path_buf();
        let render_prompt = render_prompt.clone();
        let max_retries = config.max_retries;
        let event_sink = event_sink.clone();
        let cancel = cancel.clone();
        let semaphore = semaphore.clone();
        let successes = successes.clone();
        let failures = failures.clone();

        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire().await.expect("semaphore never closed");
            let other_refs: Vec<&Epic> = other_epics.iter().collect();
            let known: HashSet<&str> = known_epic_ids_owned.iter().map(|s| s.as_str()).collect();

            let outcome = run_worker(
                agent.as_ref(),
                &agent_name,
                rate_limiter.as_ref(),
                &prd,
                &epic,
                &other_refs,
                &known,
                &work_dir,
                render_prompt.as_ref(),
                max_retries,
                event_sink.as_ref(),
                &cancel,
            )
            .await;

            match outcome {
                Ok(result) => successes.lock().unwrap().push(result),
                Err(failure) => failures.lock().unwrap().push(failure),
            }
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }

    let mut successes = Arc::try_unwrap(successes).unwrap().into_inner().unwrap();
    successes.sort_by(|a, b| a.epic_id.cmp(&b.epic_id));
    let failures = Arc::try_unwrap(failures).unwrap().into_inner().unwrap();

    ScatterOutput { successes, failures, cancelled: cancel.is_cancelled() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::agent::MockAgent;
    use std::time::Duration;

    fn epic(id: &str) -> Epic {
        Epic {
            id: id.to_string(),
            title: format!("Epic {id}"),
            description: "d".to_string(),
            prd_sections: vec![],
            estimated_task_count: 1,
            dependencies_on_epics: vec![],
        }
    }

    fn noop_prompt(_prd: &str, _epic: &Epic, _others: &[&Epic], _path: &Path, _errors: &str) -> String {
        "render the tasks".to_string()
    }

    fn agent_result(stdout: impl Into<String>) -> Result<crate::domain::ports::agent::AgentResult, AgentError> {
        Ok(crate::domain::ports::agent::AgentResult {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
            duration: Duration::from_millis(1),
            rate_limit: None,
        })
    }

    fn task_result_json(epic_id: &str) -> String {
        format!(
            r#"{{"epic_id":"{epic_id}","tasks":[{{"temp_id":"{}01","title":"t","description":"d","acceptance_criteria":["works"],"local_dependencies":[],"cross_epic_dependencies":[],"effort":"small","priority":"must-have"}}]}}"#,
            epic_id.replace("E-", "E") + "-T",
        )
    }

    #[test]
    fn sanitize_keeps_only_safe_characters() {
        assert_eq!(sanitize_epic_id("E-001"), Some("E-001".to_string()));
        assert_eq!(sanitize_epic_id("../../etc/passwd"), Some("etcpasswd".to_string()));
        assert_eq!(sanitize_epic_id("///"), None);
    }

    #[test]
    fn derive_output_path_stays_under_work_dir() {
        let work_dir = Path::new("/tmp/work");
        let path = derive_output_path(work_dir, "E-001").unwrap();
        assert_eq!(path, Path::new("/tmp/work/epic-E-001.json"));
    }

    #[tokio::test]
    async fn all_epics_succeed_and_sort_by_epic_id() {
        let dir = tempfile::tempdir().unwrap();
        let breakdown = EpicBreakdown { epics: vec![epic("E-002"), epic("E-001")] };

        let agent: Arc<dyn Agent> = Arc::new(MockAgent::new(vec![
            agent_result(task_result_json("E-002")),
            agent_result(task_result_json("E-001")),
        ]));
        let rate_limiter = Arc::new(RateLimitCoordinator::new(Duration::from_secs(1), 0.0, 5));
        let render_prompt: Arc<ScatterPromptRenderer> = Arc::new(noop_prompt);
        let config = ScatterConfig { max_retries: 3, max_concurrency: 2 };
        let cancel = CancellationToken::new();

        let output = scatter(agent, "claude", rate_limiter, "prd text", &breakdown, dir.path(), render_prompt, &config, None, &cancel).await;

        assert_eq!(output.failures.len(), 0);
        assert_eq!(output.successes.len(), 2);
        assert_eq!(output.successes[0].epic_id, "E-001");
        assert_eq!(output.successes[1].epic_id, "E-002");
    }

    #[tokio::test]
    async fn one_epic_exhausting_does_not_cancel_the_other() {
        let dir = tempfile::tempdir().unwrap();
        let breakdown = EpicBreakdown { epics: vec![epic("E-001"), epic("E-002")] };

        // Both workers share the same mock queue; since each worker's
        // request is independent this just needs to always return
        // unparsable output for a deterministic exhaustion case.
        let agent: Arc<dyn Agent> = Arc::new(MockAgent::always_invalid());
        let rate_limiter = Arc::new(RateLimitCoordinator::new(Duration::from_secs(1), 0.0, 5));
        let render_prompt: Arc<ScatterPromptRenderer> = Arc::new(noop_prompt);
        let config = ScatterConfig { max_retries: 1, max_concurrency: 2 };
        let cancel = CancellationToken::new();

        let output = scatter(agent, "claude", rate_limiter, "prd text", &breakdown, dir.path(), render_prompt, &config, None, &cancel).await;

        assert_eq!(output.successes.len(), 0);
        assert_eq!(output.failures.len(), 2);
        assert!(!output.cancelled);
    }

    #[tokio::test]
    async fn rate_limit_signal_retries_without_consuming_an_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let breakdown = EpicBreakdown { epics: vec![epic("E-001")] };

        let agent: Arc<dyn Agent> = Arc::new(MockAgent::new(vec![
            agent_result("RATE_LIMIT reached, please retry"),
            agent_result(task_result_json("E-001")),
        ]));
        let rate_limiter = Arc::new(RateLimitCoordinator::new(Duration::from_millis(1), 0.0, 5));
        let render_prompt: Arc<ScatterPromptRenderer> = Arc::new(noop_prompt);
        // max_retries = 0 would exhaust after one non-rate-limited attempt;
        // the rate-limited attempt must not have consumed that budget.
        let config = ScatterConfig { max_retries: 0, max_concurrency: 1 };
        let cancel = CancellationToken::new();

        let output = scatter(agent, "claude", rate_limiter, "prd text", &breakdown, dir.path(), render_prompt, &config, None, &cancel).await;

        assert_eq!(output.failures.len(), 0);
        assert_eq!(output.successes.len(), 1);
    }
}
