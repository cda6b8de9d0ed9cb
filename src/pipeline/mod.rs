//! Batch generation pipeline: configuration and the orchestrator.

mod config;
mod orchestrator;

pub use config::{ConfigError, GenerationConfig};
pub use orchestrator::{BatchOrchestrator, PipelineError, RunReport};
