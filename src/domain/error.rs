//! Domain error types for the Raven orchestration engine.
//!
//! Each enum represents errors from one concern. `RavenError` aggregates
//! them with `#[from]` conversions so call sites can use `?` freely while
//! keeping the individual taxonomies precise enough for callers who need to
//! branch on a specific failure mode (the scatter orchestrator, for
//! instance, needs to tell a validation exhaustion apart from a cancellation).

use thiserror::Error;

/// Errors from schema validation (C1).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("input exceeds size cap: {actual} bytes > {cap} bytes")]
    SizeCapExceeded { actual: u64, cap: u64 },

    #[error("{0}")]
    Field(String),
}

/// One field-path error produced by the validator, used for retry-prompt
/// injection in the shredder and scatter workers.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FieldError {
    pub field_path: String,
    pub message: String,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field_path, self.message)
    }
}

/// Errors from the agent invocation contract (C3).
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("failed to spawn agent process: {0}")]
    SpawnFailed(String),

    #[error("agent process exited abnormally: {0}")]
    AbnormalExit(String),

    #[error("agent invocation cancelled")]
    Cancelled,

    #[error("io error communicating with agent: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the rate-limit coordinator (C2).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("max-waits-exceeded")]
    MaxWaitsExceeded,

    #[error("wait cancelled")]
    Cancelled,
}

/// Errors from the shredder (C4).
#[derive(Error, Debug)]
pub enum ShredError {
    #[error("PRD file exceeds size cap: {actual} bytes > {cap} bytes")]
    PrdSizeCapExceeded { actual: u64, cap: u64 },

    #[error("cancelled")]
    Cancelled,

    #[error("agent invocation failed: {0}")]
    Agent(#[from] AgentError),

    #[error(
        "shred: validation exhausted after {attempts} attempts:\n{}",
        format_numbered(errors)
    )]
    ValidationExhausted {
        attempts: u32,
        errors: Vec<FieldError>,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the scatter orchestrator (C5), surfaced only when the whole
/// run is terminal (a single epic's failure does not reach this type; it is
/// recorded as a `ScatterFailure` instead).
#[derive(Error, Debug)]
pub enum ScatterError {
    #[error("cancelled")]
    Cancelled,
}

/// Errors from the merge pipeline (C6).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("cyclic epic dependency detected; epics form a cycle: {0:?}")]
    CyclicEpicDependency(Vec<String>),
}

/// Errors from the DAG validator (C7).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DagError {
    #[error("cycle detected in task dependency graph: {0:?}")]
    Cycle(Vec<String>),
}

/// Errors from the emitter (C8).
#[derive(Error, Debug)]
pub enum EmitError {
    #[error("refusing to overwrite existing file: {0}")]
    WouldOverwrite(std::path::PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the loop runner (C9).
#[derive(Error, Debug)]
pub enum LoopError {
    #[error("cancelled")]
    Cancelled,

    #[error("maximum iterations ({0}) exceeded")]
    MaxIterationsExceeded(u32),

    #[error("rate limit wait exhausted")]
    RateLimitExhausted,

    #[error("RAVEN_ERROR: {0}")]
    AgentReportedError(String),

    #[error("agent invocation failed: {0}")]
    Agent(#[from] AgentError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from configuration loading and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid max_concurrency: {0}. Must be at least 1")]
    InvalidMaxConcurrency(usize),

    #[error("invalid max_retries: {0}. Cannot be 0")]
    InvalidMaxRetries(u32),

    #[error(
        "invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Top-level error type aggregating every concern-specific taxonomy.
#[derive(Error, Debug)]
pub enum RavenError {
    #[error("validation: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    RateLimit(#[from] RateLimitError),

    #[error(transparent)]
    Shred(#[from] ShredError),

    #[error(transparent)]
    Scatter(#[from] ScatterError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Dag(#[from] DagError),

    #[error(transparent)]
    Emit(#[from] EmitError),

    #[error(transparent)]
    Loop(#[from] LoopError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn format_numbered(errors: &[FieldError]) -> String {
    errors
        .iter()
        .enumerate()
        .map(|(i, e)| format!("{}. {}", i + 1, e))
        .collect::<Vec<_>>()
        .join("\n")
}
