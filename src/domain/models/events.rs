//! Event records emitted through the non-blocking `EventSink` channel.
//!
//! Emission is always non-blocking: callers hold a bounded `mpsc::Sender`
//! and use `try_send`, dropping the event silently if the channel is full or
//! absent (`spec.md` §4.4/§4.9 — "event emission is non-blocking").

use serde::{Deserialize, Serialize};

use crate::domain::error::FieldError;

type FieldErrorList = Vec<FieldError>;

/// Events emitted by the shredder (C4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ShredEvent {
    Started,
    Retry { attempt: u32, errors: FieldErrorList },
    Completed,
    Failed { errors: FieldErrorList },
}

/// Events emitted by the scatter orchestrator (C5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScatterEvent {
    WorkerStarted { epic_id: String },
    WorkerRetry { epic_id: String, attempt: u32 },
    RateLimited { epic_id: String },
    WorkerSucceeded { epic_id: String },
    WorkerFailed { epic_id: String },
}

/// Events emitted by the loop runner (C9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LoopEvent {
    AgentStarted { task_id: String },
    AgentThinking { task_id: String, text: String },
    ToolStarted { task_id: String, tool: String },
    ToolCompleted { task_id: String, tool: String, is_error: bool },
    SessionStats { task_id: String, cost_usd: f64 },
    RateLimitWait { task_id: String },
    RateLimitResume { task_id: String },
    TaskCompleted { task_id: String },
    TaskBlocked { task_id: String, detail: String },
    PhaseComplete,
    LoopAborted { reason: String },
    MaxIterations { limit: u32 },
    DryRun { task_id: String, command: String },
    StaleSelection { task_id: String },
}
