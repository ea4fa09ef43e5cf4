//! A scriptable `Agent` test double: returns a queued sequence of canned
//! results (or the same fixed result every time), optionally carrying rate
//! limit signals, without spawning any process.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::error::AgentError;
use crate::domain::ports::agent::{Agent, AgentRequest, AgentResult, RateLimitSignal, StreamEvent};

pub struct MockAgent {
    responses: Mutex<Vec<Result<AgentResult, AgentError>>>,
    calls: Mutex<Vec<AgentRequest>>,
}

impl MockAgent {
    /// Responses are consumed front-to-back; the last one repeats once the
    /// queue is drained.
    pub fn new(responses: Vec<Result<AgentResult, AgentError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding(stdout: impl Into<String>) -> Self {
        Self::new(vec![Ok(ok_result(stdout.into(), None))])
    }

    pub fn always_invalid() -> Self {
        Self::new(vec![Ok(ok_result("not json".to_string(), None))])
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

fn ok_result(stdout: String, rate_limit: Option<RateLimitSignal>) -> AgentResult {
    AgentResult {
        stdout,
        stderr: String::new(),
        exit_code: 0,
        duration: Duration::from_millis(1),
        rate_limit,
    }
}

#[async_trait]
impl Agent for MockAgent {
    async fn run(&self, request: &AgentRequest, _event_tx: Option<mpsc::Sender<StreamEvent>>) -> Result<AgentResult, AgentError> {
        self.calls.lock().unwrap().push(request.clone());
        let mut responses = self.responses.lock().unwrap();
        if responses.len() > 1 {
            responses.remove(0)
        } else if let Some(last) = responses.first() {
            clone_result(last)
        } else {
            Ok(ok_result(String::new(), None))
        }
    }

    fn parse_rate_limit(&self, text: &str) -> (Option<RateLimitSignal>, bool) {
        if text.contains("RATE_LIMIT") {
            (Some(RateLimitSignal { reset_at: None, wait: Some(Duration::from_millis(1)) }), true)
        } else {
            (None, false)
        }
    }

    fn dry_run_command(&self, request: &AgentRequest) -> String {
        format!("mock-agent {}", request.prompt)
    }
}

fn clone_result(result: &Result<AgentResult, AgentError>) -> Result<AgentResult, AgentError> {
    match result {
        Ok(r) => Ok(AgentResult {
            stdout: r.stdout.clone(),
            stderr: r.stderr.clone(),
            exit_code: r.exit_code,
            duration: r.duration,
            rate_limit: r.rate_limit.clone(),
        }),
        Err(AgentError::SpawnFailed(s)) => Err(AgentError::SpawnFailed(s.clone())),
        Err(AgentError::AbnormalExit(s)) => Err(AgentError::AbnormalExit(s.clone())),
        Err(AgentError::Cancelled) => Err(AgentError::Cancelled),
        Err(AgentError::Io(e)) => Err(AgentError::Io(std::io::Error::new(e.kind(), e.to_string()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_queued_responses_in_order_then_repeats_last() {
        let agent = MockAgent::new(vec![Ok(ok_result("first".to_string(), None)), Ok(ok_result("second".to_string(), None))]);
        let request = AgentRequest::new("p", "/tmp");
        assert_eq!(agent.run(&request, None).await.unwrap().stdout, "first");
        assert_eq!(agent.run(&request, None).await.unwrap().stdout, "second");
        assert_eq!(agent.run(&request, None).await.unwrap().stdout, "second");
        assert_eq!(agent.call_count(), 3);
    }

    #[test]
    fn parse_rate_limit_recognizes_marker() {
        let agent = MockAgent::always_invalid();
        let (signal, found) = agent.parse_rate_limit("RATE_LIMIT reached");
        assert!(found);
        assert!(signal.is_some());
    }
}
