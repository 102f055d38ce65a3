//! The status messages sent by the server over the progress channel.
//!
//! Each message is a UTF-8 JSON object:
//!
//! ```text
//! { "step": string, "status"?: string, "details"?: any, "result"?: any, "error"?: any }
//! ```
//!
//! The `step` values [`STEP_COMPLETE`] and [`STEP_ERROR`] are terminal, every other step is a
//! progress label passed through verbatim.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Step sentinel marking the job as successfully finished, payload in `result`.
pub const STEP_COMPLETE: &str = "complete";
/// Step sentinel marking the job as failed, message in `error`.
pub const STEP_ERROR: &str = "error";

const DEFAULT_SERVER_ERROR: &str = "Optimization failed";

/// A non-terminal progress update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Identifier of the current phase, e.g. `"analyzing"`.
    pub step: String,
    /// Human readable status of the phase.
    pub status: String,
    pub details: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    step: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// A decoded message.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Progress(ProgressEvent),
    Complete(Value),
    Failed(String),
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Failed to parse progress data: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Progress data is not a JSON object: {0}")]
    NotAnObject(String),
}

impl Frame {
    pub fn parse(message: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(message)?;
        if !value.is_object() {
            return Err(FrameError::NotAnObject(message.to_owned()));
        }
        let raw: RawFrame = serde_json::from_value(value)?;

        Ok(match raw.step.as_str() {
            STEP_COMPLETE => Self::Complete(raw.result.unwrap_or(Value::Null)),
            STEP_ERROR => Self::Failed(match raw.error {
                Some(Value::String(message)) if !message.is_empty() => message,
                Some(Value::Null | Value::String(_)) | None => DEFAULT_SERVER_ERROR.to_owned(),
                Some(other) => other.to_string(),
            }),
            _ => Self::Progress(ProgressEvent {
                step: raw.step,
                status: raw.status.unwrap_or_default(),
                details: raw.details,
            }),
        })
    }
}
