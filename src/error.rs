//! Error types for the tileboard generation-and-delivery pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Classified failure of a provider `generate` call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ProviderError {
    #[error("Provider rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Provider overloaded: {0}")]
    Overloaded(String),

    #[error("Provider request failed: {0}")]
    RequestFailed(String),

    #[error("Provider authentication failed: {0}")]
    AuthFailed(String),

    #[error("Provider rejected request: {0}")]
    InvalidRequest(String),

    #[error("Provider model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider returned an empty response")]
    EmptyResponse,

    #[error("Provider error: {0}")]
    Other(String),
}

impl ProviderError {
    /// Whether the retry engine may spend another attempt after this failure.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::RateLimited(_) => true,
            ProviderError::Overloaded(_) => true,
            ProviderError::RequestFailed(_) => true,
            ProviderError::EmptyResponse => true,
            ProviderError::AuthFailed(_) => false,
            ProviderError::InvalidRequest(_) => false,
            ProviderError::ModelNotFound(_) => false,
            _ => true,
        }
    }

    /// Map an HTTP status and body into a classified error.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 | 403 => ProviderError::AuthFailed(format!("status {}: {}", status, body)),
            400 | 422 => ProviderError::InvalidRequest(format!("status {}: {}", status, body)),
            404 => ProviderError::ModelNotFound(format!("status {}: {}", status, body)),
            429 => ProviderError::RateLimited(format!("status {}: {}", status, body)),
            503 | 529 => ProviderError::Overloaded(format!("status {}: {}", status, body)),
            _ => ProviderError::RequestFailed(format!("status {}: {}", status, body)),
        }
    }
}

/// Physical-constraint violations found while validating generated output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Content is empty after normalization")]
    EmptyContent,

    #[error("Too many lines: {lines} (max {max})")]
    TooManyLines { lines: usize, max: usize },

    #[error("Line {line} is {length} characters (max {max})")]
    LineTooLong { line: usize, length: usize, max: usize },

    #[error("Unsupported characters: {}", format_chars(.0))]
    InvalidCharacters(BTreeSet<char>),

    #[error("Layout must have exactly {expected} rows, got {actual}")]
    LayoutRowCount { expected: usize, actual: usize },

    #[error("Layout row {row} must have exactly {expected} cells, got {actual}")]
    LayoutRowLength {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Glyph code {code} at row {row}, column {column} is outside 0..=71")]
    CodeOutOfRange { row: usize, column: usize, code: i64 },

    #[error("Content is missing its {0} payload")]
    MissingPayload(&'static str),
}

fn format_chars(chars: &BTreeSet<char>) -> String {
    chars
        .iter()
        .map(|c| format!("'{}' (U+{:04X})", c, *c as u32))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Storage errors from circuit stores and attempt logs.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(String),

    #[error("Storage data error: {0}")]
    Data(String),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Data(err.to_string())
    }
}

/// One failed attempt within a single retry sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedAttempt {
    pub provider: String,
    /// 1-based attempt number within this provider
    pub attempt: u32,
    pub error: ProviderError,
    pub timestamp: DateTime<Utc>,
}

/// Orchestration-level errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("All {} attempts failed", .attempts.len())]
    RetryExhausted { attempts: Vec<FailedAttempt> },

    #[error("No attempts made: circuits unavailable ({})", .circuits.join(", "))]
    CircuitUnavailable { circuits: Vec<String> },

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Generator not found: {0}")]
    GeneratorNotFound(String),

    #[error("No generator available: {0}")]
    NoGeneratorAvailable(String),

    #[error("Frame decoration failed: {0}")]
    Frame(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Failures of the primary generator that send the orchestrator to the fallback tier.
    pub fn triggers_fallback(&self) -> bool {
        matches!(
            self,
            PipelineError::Provider(_)
                | PipelineError::RetryExhausted { .. }
                | PipelineError::CircuitUnavailable { .. }
                | PipelineError::Validation(_)
        )
    }

    /// Attempts recorded by the retry engine, if any.
    pub fn attempts(&self) -> &[FailedAttempt] {
        match self {
            PipelineError::RetryExhausted { attempts } => attempts,
            _ => &[],
        }
    }
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::Config(err.to_string())
    }
}
