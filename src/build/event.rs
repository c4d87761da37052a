//! Decoding of single build-stream records.
//!
//! The engine emits one JSON object per record. Two shapes are understood:
//!
//! - `{"stream": "<line>"}`: a log line, and nothing else in the record;
//! - `{"errorDetail": {"message": "<text>", ...}, ...}`: a fatal error.
//!
//! Everything else is malformed and reported as such.

use crate::engine::BuildEvent;
use crate::error::{PierError, Result};
use serde_json::{Map, Value};

const STREAM_FIELD: &str = "stream";
const ERROR_DETAIL_FIELD: &str = "errorDetail";
const MESSAGE_FIELD: &str = "message";

/// A successfully decoded build record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedEvent {
    /// Build output line
    Log(String),
    /// Fatal error reported by the engine
    Fatal(String),
}

/// Decode one build record.
///
/// Extra diagnostic fields inside `errorDetail` (such as `code`) are appended
/// to the failure message as `[key=value, ...]` rather than dropped.
///
/// # Errors
///
/// Returns `BuildEventMalformed` carrying the raw record when it is neither a
/// lone `stream` field nor an `errorDetail` object with a string `message`.
pub fn parse_build_event(event: &BuildEvent) -> Result<ParsedEvent> {
    let fields = event.as_object().ok_or_else(|| malformed(event))?;

    if let Some(detail) = fields.get(ERROR_DETAIL_FIELD) {
        let detail = detail.as_object().ok_or_else(|| malformed(event))?;
        let message = detail
            .get(MESSAGE_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| malformed(event))?;
        return Ok(ParsedEvent::Fatal(with_diagnostics(message, detail)));
    }

    match (fields.len(), fields.get(STREAM_FIELD)) {
        (1, Some(Value::String(line))) => Ok(ParsedEvent::Log(line.clone())),
        _ => Err(malformed(event)),
    }
}

/// Decode one build record from its JSON text.
///
/// # Errors
///
/// Returns `BuildEventMalformed` if the text is not JSON or the record has an
/// unknown shape.
pub fn parse_build_event_json(raw: &str) -> Result<ParsedEvent> {
    let event: BuildEvent = serde_json::from_str(raw)
        .map_err(|_| PierError::BuildEventMalformed(raw.trim_end().to_string()))?;
    parse_build_event(&event)
}

fn malformed(event: &BuildEvent) -> PierError {
    PierError::BuildEventMalformed(event.to_string())
}

fn with_diagnostics(message: &str, detail: &Map<String, Value>) -> String {
    let extras: Vec<String> = detail
        .iter()
        .filter(|(key, _)| key.as_str() != MESSAGE_FIELD)
        .map(|(key, value)| match value {
            Value::String(s) => format!("{}={}", key, s),
            other => format!("{}={}", key, other),
        })
        .collect();

    if extras.is_empty() {
        message.to_string()
    } else {
        format!("{} [{}]", message, extras.join(", "))
    }
}
