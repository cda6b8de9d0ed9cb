//! Error types for kanjigen operations.
//!
//! Defines the error taxonomy shared across the pipeline layers:
//! - Backend invocation (process spawning, timeouts, exit codes)
//! - Output extraction (plain text and event streams)
//! - Schema validation
//! - Result store persistence
//!
//! All of these flatten into [`ClassifiedError`], the backend-agnostic shape
//! persisted with failed items. The message text of the source error is
//! preserved verbatim so an operator sees the same diagnostics regardless of
//! which backend produced them.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while invoking a backend process.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// The process exceeded the configured timeout and was killed.
    #[error("backend timed out after {0:?}")]
    Timeout(Duration),

    /// The process exited with a non-zero status.
    #[error("backend exited with code {code}: {stderr_tail}")]
    BackendFailure { code: i32, stderr_tail: String },

    /// The process could not be spawned or its pipes could not be driven.
    #[error("failed to spawn backend process: {0}")]
    ProcessSpawnFailure(String),
}

/// Errors raised while extracting a candidate document from raw output.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractionError {
    /// Nothing remained after trimming whitespace and fence markers.
    #[error("backend produced no usable output")]
    EmptyOutput,

    /// The event stream contained no completed assistant message.
    #[error("no completed agent message found in event stream")]
    NoCompletedMessage,

    /// The scan finished without a completed message and some events could
    /// not be parsed. Malformed intermediate events never abort the scan.
    #[error("no completed agent message found; {skipped} event(s) could not be parsed")]
    MalformedEvent { skipped: usize },
}

/// Errors raised while validating a candidate document against the schema.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The candidate text did not parse as JSON. A truncated preview of the
    /// raw text is kept for diagnostics.
    #[error("response is not valid JSON: {reason} (raw: {raw_preview})")]
    NotJson { reason: String, raw_preview: String },

    /// A required field is absent. The field name is a dotted path, e.g.
    /// `readings[0].anchor.hint`.
    #[error("missing required field '{0}'")]
    MissingField(String),

    /// A field is present but has the wrong type, is empty, or violates a
    /// length constraint.
    #[error("field '{field}' has unexpected shape: {reason}")]
    ShapeMismatch { field: String, reason: String },
}

/// Errors raised by the result store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The atomic rename of the temp file onto the database failed.
    #[error("conflicting write to result store: {0}")]
    WriteConflict(String),

    /// Reading or writing the database file failed.
    #[error("result store IO failure: {0}")]
    IoFailure(#[from] std::io::Error),

    /// The database file exists but could not be parsed.
    #[error("result store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Backend-agnostic error kind, mirroring the taxonomy above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    BackendFailure,
    ProcessSpawnFailure,
    EmptyOutput,
    NoCompletedMessage,
    MalformedEvent,
    NotJson,
    MissingField,
    ShapeMismatch,
    WriteConflict,
    IoFailure,
}

impl ErrorKind {
    /// Returns the retry class used by the orchestrator to pick a ceiling.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            ErrorKind::Timeout
            | ErrorKind::BackendFailure
            | ErrorKind::ProcessSpawnFailure
            | ErrorKind::EmptyOutput
            | ErrorKind::NoCompletedMessage
            | ErrorKind::MalformedEvent
            | ErrorKind::WriteConflict
            | ErrorKind::IoFailure => RetryClass::Transient,
            ErrorKind::MissingField | ErrorKind::ShapeMismatch => RetryClass::Validation,
            ErrorKind::NotJson => RetryClass::Format,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::BackendFailure => "backend_failure",
            ErrorKind::ProcessSpawnFailure => "process_spawn_failure",
            ErrorKind::EmptyOutput => "empty_output",
            ErrorKind::NoCompletedMessage => "no_completed_message",
            ErrorKind::MalformedEvent => "malformed_event",
            ErrorKind::NotJson => "not_json",
            ErrorKind::MissingField => "missing_field",
            ErrorKind::ShapeMismatch => "shape_mismatch",
            ErrorKind::WriteConflict => "write_conflict",
            ErrorKind::IoFailure => "io_failure",
        };
        write!(f, "{}", name)
    }
}

/// Classification of an error kind into a retry policy bucket.
///
/// Serialized as a map key in the result store, so failed attempts can be
/// tallied per class across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryClass {
    /// Backend flakiness: timeouts, non-zero exits, extraction misses.
    /// Retried up to the largest ceiling.
    Transient,
    /// Structurally parseable but schema-incomplete output. Model
    /// nondeterminism can self-correct, so a smaller ceiling applies.
    Validation,
    /// Output that is not JSON at all. Usually a persistent formatting
    /// failure; retried once by default.
    Format,
}

/// An error kind plus the source error's message, preserved verbatim.
///
/// This is the shape persisted with failed items and surfaced to operators.
/// Its structure is identical regardless of which backend produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Returns the retry class of this error.
    pub fn retry_class(&self) -> RetryClass {
        self.kind.retry_class()
    }
}

impl std::fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<InvocationError> for ClassifiedError {
    fn from(err: InvocationError) -> Self {
        let kind = match &err {
            InvocationError::Timeout(_) => ErrorKind::Timeout,
            InvocationError::BackendFailure { .. } => ErrorKind::BackendFailure,
            InvocationError::ProcessSpawnFailure(_) => ErrorKind::ProcessSpawnFailure,
        };
        Self::new(kind, err.to_string())
    }
}

impl From<ExtractionError> for ClassifiedError {
    fn from(err: ExtractionError) -> Self {
        let kind = match &err {
            ExtractionError::EmptyOutput => ErrorKind::EmptyOutput,
            ExtractionError::NoCompletedMessage => ErrorKind::NoCompletedMessage,
            ExtractionError::MalformedEvent { .. } => ErrorKind::MalformedEvent,
        };
        Self::new(kind, err.to_string())
    }
}

impl From<ValidationError> for ClassifiedError {
    fn from(err: ValidationError) -> Self {
        let kind = match &err {
            ValidationError::NotJson { .. } => ErrorKind::NotJson,
            ValidationError::MissingField(_) => ErrorKind::MissingField,
            ValidationError::ShapeMismatch { .. } => ErrorKind::ShapeMismatch,
        };
        Self::new(kind, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classes() {
        assert_eq!(ErrorKind::Timeout.retry_class(), RetryClass::Transient);
        assert_eq!(
            ErrorKind::NoCompletedMessage.retry_class(),
            RetryClass::Transient
        );
        assert_eq!(ErrorKind::MissingField.retry_class(), RetryClass::Validation);
        assert_eq!(ErrorKind::ShapeMismatch.retry_class(), RetryClass::Validation);
        assert_eq!(ErrorKind::NotJson.retry_class(), RetryClass::Format);
    }

    #[test]
    fn test_classified_error_preserves_message() {
        let err = InvocationError::BackendFailure {
            code: 2,
            stderr_tail: "rate limited".to_string(),
        };
        let message = err.to_string();
        let classified = ClassifiedError::from(err);
        assert_eq!(classified.kind, ErrorKind::BackendFailure);
        assert_eq!(classified.message, message);
    }

    #[test]
    fn test_classified_error_roundtrip_serde() {
        let classified = ClassifiedError::new(ErrorKind::NotJson, "bad output");
        let json = serde_json::to_string(&classified).unwrap();
        assert!(json.contains("not_json"));
        let back: ClassifiedError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, classified);
    }

    #[test]
    fn test_display_is_backend_agnostic() {
        let a = ClassifiedError::new(ErrorKind::Timeout, "backend timed out after 180s");
        assert_eq!(a.to_string(), "timeout: backend timed out after 180s");
    }
}
