use model::ModelError;
use snapshot::SnapshotError;
use std::fmt;
use thiserror::Error;

/// Errors raised by the judge pipeline
#[derive(Error, Debug)]
pub enum JudgeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Response format error: {0}")]
    ResponseFormat(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Empty result: {0}")]
    EmptyResult(String),

    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Model error: {0}")]
    Model(#[source] ModelError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

impl From<ModelError> for JudgeError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::MissingCredential { .. } | ModelError::InvalidConfig { .. } => {
                JudgeError::Configuration(err.to_string())
            }
            other => JudgeError::Model(other),
        }
    }
}

pub type JudgeResult<T> = Result<T, JudgeError>;

/// A single response item that failed schema validation.
///
/// Never fatal on its own: the item is dropped and the rest of the
/// response is kept.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub index: usize,
    pub reason: String,
}

impl ValidationError {
    pub fn new(index: usize, reason: impl Into<String>) -> Self {
        Self {
            index,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item {}: {}", self.index, self.reason)
    }
}

impl std::error::Error for ValidationError {}

/// Failures reading or writing the question cache file
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Malformed question cache at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("Failed to write question cache: {0}")]
    Write(#[from] std::io::Error),
}

impl CacheError {
    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        CacheError::Malformed {
            line,
            reason: reason.into(),
        }
    }
}
