//! kanjigen: batch generator for structured kanji-explanation records.
//!
//! The pipeline walks a catalog of kyoiku kanji, invokes an interchangeable
//! LLM CLI backend for each, extracts a JSON candidate from plain-text or
//! event-stream output, validates it against a versioned record schema, and
//! persists every outcome to a resumable JSON result store.

pub mod backend;
pub mod catalog;
pub mod cli;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod prompt;
pub mod schema;
pub mod store;

// Re-export commonly used error types
pub use error::{
    ClassifiedError, ErrorKind, ExtractionError, InvocationError, RetryClass, StoreError,
    ValidationError,
};
