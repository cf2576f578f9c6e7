//! Application-wide error types.

use std::path::PathBuf;

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Too many active jobs for this client: {active} of {limit} allowed")]
    TooManyActiveJobs { active: u32, limit: u32 },

    #[error("Invalid asset URL: {0}")]
    InvalidUrl(String),

    #[error("Protocol not allowed for asset URL: {0}")]
    ProtocolNotAllowed(String),

    #[error("Declared asset size {declared} bytes exceeds the {limit} byte limit")]
    SizeExceedsLimit { declared: u64, limit: u64 },

    #[error("Remote fetch failed: {0}")]
    RemoteFetchFailed(String),

    #[error("Media binary not found: {0}")]
    MissingBinary(String),

    #[error("Render pipeline failed: {0}")]
    PipelineFailed(String),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error while {op} {path}: {source}")]
    IoPath {
        op: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn io_path(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.into(),
            source,
        }
    }
}
