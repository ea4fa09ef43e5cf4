//! C2 — Rate-Limit Coordinator.
//!
//! Process-wide, per-agent-name cooperative wait state. Grounded in
//! `rate_limiter.rs`'s `Arc<Mutex<_>>`-guarded shared-counter shape,
//! generalized from token-bucket refill semantics to this spec's distinct
//! absolute-reset-time + jitter + consecutive-wait-cap model (§4.2). Modeled
//! as an explicit, injected collaborator rather than a hidden singleton —
//! scatter workers share one instance, never a static.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::domain::error::RateLimitError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitRecord {
    pub limited: bool,
    pub reset_at: Option<DateTime<Utc>>,
    pub consecutive_waits: u32,
}

impl Default for RateLimitRecord {
    fn default() -> Self {
        Self {
            limited: false,
            reset_at: None,
            consecutive_waits: 0,
        }
    }
}

pub struct RateLimitCoordinator {
    records: Mutex<HashMap<String, RateLimitRecord>>,
    default_wait: Duration,
    jitter: f64,
    max_waits: u32,
}

impl RateLimitCoordinator {
    pub fn new(default_wait: Duration, jitter: f64, max_waits: u32) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            default_wait,
            jitter,
            max_waits,
        }
    }

    /// Record a rate-limit hit for `agent_name`. `reset_at` becomes
    /// `now + max(wait, default_wait) * (1 + jitter)`, and the consecutive
    /// wait counter increments.
    pub fn record_rate_limit(&self, agent_name: &str, wait: Option<Duration>) {
        let mut records = self.records.lock().unwrap();
        let entry = records.entry(agent_name.to_string()).or_default();
        let base = wait.unwrap_or(self.default_wait).max(self.default_wait);
        let jittered_secs = base.as_secs_f64() * (1.0 + self.jitter);
        entry.limited = true;
        entry.reset_at = Some(Utc::now() + chrono::Duration::milliseconds((jittered_secs * 1000.0) as i64));
        entry.consecutive_waits += 1;
    }

    /// Return the current record if `agent_name` is limited and its reset
    /// time is still in the future.
    pub fn should_wait(&self, agent_name: &str) -> Option<RateLimitRecord> {
        let records = self.records.lock().unwrap();
        records.get(agent_name).copied().filter(|r| r.limited && r.reset_at.is_some_and(|t| t > Utc::now()))
    }

    /// Block until the reset time elapses or `cancel` fires. If the
    /// consecutive-wait counter has already reached the configured maximum
    /// on entry, return [`RateLimitError::MaxWaitsExceeded`] immediately
    /// without waiting.
    pub async fn wait_for_reset(&self, agent_name: &str, cancel: &CancellationToken) -> Result<(), RateLimitError> {
        let (reset_at, waits) = {
            let records = self.records.lock().unwrap();
            match records.get(agent_name) {
                Some(r) => (r.reset_at, r.consecutive_waits),
                None => return Ok(()),
            }
        };

        if waits >= self.max_waits {
            return Err(RateLimitError::MaxWaitsExceeded);
        }

        let Some(reset_at) = reset_at else { return Ok(()) };
        let now = Utc::now();
        if reset_at <= now {
            return Ok(());
        }
        let wait_duration = (reset_at - now).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = tokio::time::sleep(wait_duration) => Ok(()),
            _ = cancel.cancelled() => Err(RateLimitError::Cancelled),
        }
    }

    /// Clear the limited flag and reset the consecutive-wait counter after
    /// a successful, non-limited call.
    pub fn clear_rate_limit(&self, agent_name: &str) {
        let mut records = self.records.lock().unwrap();
        if let Some(entry) = records.get_mut(agent_name) {
            entry.limited = false;
            entry.consecutive_waits = 0;
            entry.reset_at = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_then_should_wait_reports_limited() {
        let coordinator = RateLimitCoordinator::new(Duration::from_secs(60), 0.1, 5);
        coordinator.record_rate_limit("claude", Some(Duration::from_secs(30)));
        let record = coordinator.should_wait("claude").unwrap();
        assert!(record.limited);
        assert_eq!(record.consecutive_waits, 1);
    }

    #[test]
    fn reset_uses_the_larger_of_provided_and_default_wait() {
        let coordinator = RateLimitCoordinator::new(Duration::from_secs(120), 0.0, 5);
        let before = Utc::now();
        coordinator.record_rate_limit("claude", Some(Duration::from_secs(10)));
        let record = coordinator.should_wait("claude").unwrap();
        let reset_at = record.reset_at.unwrap();
        assert!(reset_at >= before + chrono::Duration::seconds(120));
    }

    #[test]
    fn should_wait_is_none_for_unknown_agent() {
        let coordinator = RateLimitCoordinator::new(Duration::from_secs(1), 0.0, 5);
        assert!(coordinator.should_wait("nobody").is_none());
    }

    #[test]
    fn clear_resets_limited_and_counter() {
        let coordinator = RateLimitCoordinator::new(Duration::from_millis(1), 0.0, 5);
        coordinator.record_rate_limit("claude", None);
        coordinator.clear_rate_limit("claude");
        assert!(coordinator.should_wait("claude").is_none());
    }

    #[tokio::test]
    async fn wait_for_reset_returns_immediately_once_elapsed() {
        let coordinator = RateLimitCoordinator::new(Duration::from_millis(5), 0.0, 5);
        coordinator.record_rate_limit("claude", None);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let cancel = CancellationToken::new();
        let result = coordinator.wait_for_reset("claude", &cancel).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn wait_for_reset_fails_fast_when_max_waits_reached() {
        let coordinator = RateLimitCoordinator::new(Duration::from_secs(60), 0.0, 1);
        coordinator.record_rate_limit("claude", None);
        let cancel = CancellationToken::new();
        let result = coordinator.wait_for_reset("claude", &cancel).await;
        assert!(matches!(result, Err(RateLimitError::MaxWaitsExceeded)));
    }

    #[tokio::test]
    async fn wait_for_reset_is_cancellable() {
        let coordinator = RateLimitCoordinator::new(Duration::from_secs(60), 0.0, 5);
        coordinator.record_rate_limit("claude", None);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = coordinator.wait_for_reset("claude", &cancel).await;
        assert!(matches!(result, Err(RateLimitError::Cancelled)));
    }

    #[tokio::test]
    async fn concurrent_workers_share_coordinator_state_safely() {
        use std::sync::Arc;
        let coordinator = Arc::new(RateLimitCoordinator::new(Duration::from_millis(1), 0.0, 100));
        let mut handles = Vec::new();
        for i in 0..10 {
            let coordinator = coordinator.clone();
            handles.push(tokio::spawn(async move {
                coordinator.record_rate_limit(&format!("agent-{i}"), None);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        for i in 0..10 {
            assert!(coordinator.should_wait(&format!("agent-{i}")).is_some());
        }
    }
}
