//! C4 — Shredder: sequential retry loop turning a PRD into a validated
//! `EpicBreakdown`.
//!
//! Retry-with-feedback shape grounded in `retry.rs`'s generic retry
//! closure, adapted so the retry trigger is schema-validation failure
//! (fed back into the next prompt) rather than a transient API error.

use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::domain::error::{FieldError, ShredError};
use crate::domain::models::{EpicBreakdown, ShredEvent};
use crate::domain::ports::agent::{Agent, AgentRequest};
use crate::domain::ports::event_sink::{emit, EventSink};
use crate::services::validator;

pub struct ShredderConfig {
    pub max_retries: u32,
    pub prd_size_cap_bytes: u64,
}

impl Default for ShredderConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            prd_size_cap_bytes: 1_048_576,
        }
    }
}

/// Renders the shred prompt from the PRD text, the target output path, and
/// a numbered error list from the previous attempt (empty on the first
/// try). Treated as an opaque collaborator — its exact template is outside
/// this module's concern.
pub type PromptRenderer = dyn Fn(&str, &Path, &str) -> String + Send + Sync;

async fn read_prd_capped(path: &Path, cap: u64) -> Result<String, ShredError> {
    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > cap {
        return Err(ShredError::PrdSizeCapExceeded { actual: metadata.len(), cap });
    }
    Ok(tokio::fs::read_to_string(path).await?)
}

/// Scan `text` for the first balanced `{...}` JSON object, tolerating
/// surrounding prose or markdown fences.
fn extract_first_json_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        let idx = start + offset;
        let c = byte as char;
        if in_string {
            if escape {
                escape = false;
            } else if c == '\\' {
                escape = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..=idx].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

async fn extract_breakdown(output_path: &Path, stdout: &str) -> Option<EpicBreakdown> {
    if let Ok(contents) = tokio::fs::read(output_path).await {
        if !contents.is_empty() {
            if let Ok(breakdown) = validator::parse_json_capped::<EpicBreakdown>(&contents) {
                return Some(breakdown);
            }
        }
    }
    let json_text = extract_first_json_object(stdout)?;
    serde_json::from_str(&json_text).ok()
}

fn synthetic_parse_error() -> Vec<FieldError> {
    vec![FieldError {
        field_path: "output".to_string(),
        message: "agent output did not contain parseable JSON".to_string(),
    }]
}

/// Drive the shred retry loop to completion or exhaustion.
pub async fn shred(
    agent: &dyn Agent,
    prd_path: &Path,
    output_path: &Path,
    render_prompt: &PromptRenderer,
    config: &ShredderConfig,
    event_sink: Option<&EventSink<ShredEvent>>,
    cancel: &CancellationToken,
) -> Result<EpicBreakdown, ShredError> {
    let prd = read_prd_capped(prd_path, config.prd_size_cap_bytes).await?;
    emit(event_sink, ShredEvent::Started);

    let mut previous_errors: Vec<FieldError> = Vec::new();

    for attempt in 1..=config.max_retries + 1 {
        if cancel.is_cancelled() {
            return Err(ShredError::Cancelled);
        }

        let error_text = validator::format_errors_numbered(&previous_errors);
        let prompt = render_prompt(&prd, output_path, &error_text);

        if attempt > 1 {
            let _ = tokio::fs::remove_file(output_path).await;
        }

        let working_dir = output_path.parent().unwrap_or_else(|| Path::new("."));
        let request = AgentRequest::new(prompt, working_dir);
        let result = agent.run(&request, None).await.map_err(ShredError::Agent)?;

        let breakdown = match extract_breakdown(output_path, &result.stdout).await {
            Some(b) => b,
            None => {
                previous_errors = synthetic_parse_error();
                emit(event_sink, ShredEvent::Retry { attempt, errors: previous_errors.clone() });
                continue;
            }
        };

        let errors = validator::validate_epic_breakdown(&breakdown);
        if errors.is_empty() {
            emit(event_sink, ShredEvent::Completed);
            return Ok(breakdown);
        }

        previous_errors = errors.clone();
        emit(event_sink, ShredEvent::Retry { attempt, errors });
    }

    emit(event_sink, ShredEvent::Failed { errors: previous_errors.clone() });
    Err(ShredError::ValidationExhausted { attempts: config.max_retries + 1, errors: previous_errors })
}
