//! TaskState: persistent per-task status record (`task-state.conf`).

use chrono::{DateTime, Utc};

/// Status of a task in the implementation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    NotStarted,
    InProgress,
    Completed,
    Blocked,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Blocked => "blocked",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(Self::NotStarted),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "blocked" => Some(Self::Blocked),
            _ => None,
        }
    }
}

/// One row of `task-state.conf`: `GlobalID|Status|AgentName|StartTime|EndTime`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskState {
    pub global_id: String,
    pub status: TaskStatus,
    pub agent: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl TaskState {
    pub fn not_started(global_id: impl Into<String>) -> Self {
        Self {
            global_id: global_id.into(),
            status: TaskStatus::NotStarted,
            agent: String::new(),
            start_time: None,
            end_time: None,
        }
    }

    /// Serialize this entry as one pipe-delimited line (no trailing newline).
    pub fn to_line(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.global_id,
            self.status.as_str(),
            self.agent,
            self.start_time.map(|t| t.to_rfc3339()).unwrap_or_default(),
            self.end_time.map(|t| t.to_rfc3339()).unwrap_or_default(),
        )
    }

    /// Parse one pipe-delimited line. `#`-prefixed and blank lines should be
    /// filtered by the caller before reaching this function.
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut parts = line.splitn(5, '|');
        let global_id = parts.next()?.to_string();
        let status = TaskStatus::from_str(parts.next()?)?;
        let agent = parts.next()?.to_string();
        let start_time = parts
            .next()
            .filter(|s| !s.is_empty())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc));
        let end_time = parts
            .next()
            .filter(|s| !s.is_empty())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc));

        Some(Self {
            global_id,
            status,
            agent,
            start_time,
            end_time,
        })
    }
}

/// Parse the full contents of a `task-state.conf` file, skipping `#`-prefixed
/// and blank lines.
pub fn parse_task_state_file(contents: &str) -> Vec<TaskState> {
    contents
        .lines()
        .filter(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
        .filter_map(TaskState::parse_line)
        .collect()
}
