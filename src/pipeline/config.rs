//! Configuration for the batch generation pipeline.
//!
//! Backend selection, concurrency, timeout, schema version, and the retry
//! ceilings are run-level configuration threaded into the orchestrator at
//! construction time; inner components never read environment state on
//! their own.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::backend::BackendKind;
use crate::error::RetryClass;
use crate::schema::SchemaVersion;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Configuration for the batch orchestrator.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Backend used for the whole run.
    pub backend: BackendKind,
    /// Maximum number of concurrently spawned backend processes.
    pub concurrency: usize,
    /// Hard deadline for one backend invocation.
    pub invocation_timeout: Duration,
    /// Schema revision to validate against.
    pub schema_version: SchemaVersion,
    /// Optional model override passed to the backend CLI.
    pub model: Option<String>,

    // Retry ceilings, counted in retries (total attempts = ceiling + 1).
    /// Ceiling for timeouts, backend failures, and extraction misses.
    pub transient_retries: u32,
    /// Ceiling for schema-incomplete but parseable documents.
    pub validation_retries: u32,
    /// Ceiling for output that is not JSON at all.
    pub format_retries: u32,
    /// Pause between attempts for the same item.
    pub retry_delay: Duration,

    /// Maximum number of items to process this run (0 = no limit).
    pub limit: usize,
    /// Result store database path.
    pub db_path: PathBuf,
    /// Catalog JSON path.
    pub catalog_path: PathBuf,
    /// Prompt template path.
    pub prompt_path: PathBuf,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Claude,
            concurrency: 3,
            invocation_timeout: Duration::from_secs(180),
            schema_version: SchemaVersion::V2,
            model: None,
            transient_retries: 3,
            validation_retries: 2,
            format_retries: 1,
            retry_delay: Duration::from_secs(1),
            limit: 0,
            db_path: PathBuf::from("data/kanji_db_v2.json"),
            catalog_path: PathBuf::from("data/kyoiku_kanji_2020_by_grade.json"),
            prompt_path: PathBuf::from("prompts/kanji_explain_json.md"),
        }
    }
}

impl GenerationConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies overrides from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `KANJI_BACKEND`: backend kind (default: claude)
    /// - `KANJI_CONCURRENCY`: concurrent backend processes (default: 3)
    /// - `KANJI_TIMEOUT_S`: invocation timeout in seconds (default: 180)
    /// - `KANJI_SCHEMA_VERSION`: schema revision, 1 or 2 (default: 2)
    /// - `KANJI_MODEL`: model override passed to the backend CLI
    /// - `KANJI_TRANSIENT_RETRIES` / `KANJI_VALIDATION_RETRIES` /
    ///   `KANJI_FORMAT_RETRIES`: retry ceilings (defaults: 3 / 2 / 1)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set but has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("KANJI_BACKEND") {
            config.backend = parse_env_value(&val, "KANJI_BACKEND")?;
        }
        if let Ok(val) = std::env::var("KANJI_CONCURRENCY") {
            config.concurrency = parse_env_value(&val, "KANJI_CONCURRENCY")?;
        }
        if let Ok(val) = std::env::var("KANJI_TIMEOUT_S") {
            let secs: u64 = parse_env_value(&val, "KANJI_TIMEOUT_S")?;
            config.invocation_timeout = Duration::from_secs(secs);
        }
        if let Ok(val) = std::env::var("KANJI_SCHEMA_VERSION") {
            config.schema_version = parse_env_value(&val, "KANJI_SCHEMA_VERSION")?;
        }
        if let Ok(val) = std::env::var("KANJI_MODEL") {
            config.model = Some(val);
        }
        if let Ok(val) = std::env::var("KANJI_TRANSIENT_RETRIES") {
            config.transient_retries = parse_env_value(&val, "KANJI_TRANSIENT_RETRIES")?;
        }
        if let Ok(val) = std::env::var("KANJI_VALIDATION_RETRIES") {
            config.validation_retries = parse_env_value(&val, "KANJI_VALIDATION_RETRIES")?;
        }
        if let Ok(val) = std::env::var("KANJI_FORMAT_RETRIES") {
            config.format_retries = parse_env_value(&val, "KANJI_FORMAT_RETRIES")?;
        }

        Ok(config)
    }

    /// Returns the retry ceiling for an error class.
    pub fn retries_for(&self, class: RetryClass) -> u32 {
        match class {
            RetryClass::Transient => self.transient_retries,
            RetryClass::Validation => self.validation_retries,
            RetryClass::Format => self.format_retries,
        }
    }

    /// Returns the maximum total attempts for an error class.
    pub fn max_attempts_for(&self, class: RetryClass) -> u32 {
        self.retries_for(class) + 1
    }

    /// Sets the backend kind.
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Sets the concurrency bound.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets the invocation timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.invocation_timeout = timeout;
        self
    }

    /// Sets the schema version.
    pub fn with_schema_version(mut self, version: SchemaVersion) -> Self {
        self.schema_version = version;
        self
    }

    /// Sets the pause between attempts for the same item.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets the per-run item limit (0 = no limit).
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Parses an environment variable value with a typed error.
fn parse_env_value<T>(val: &str, key: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    val.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}
