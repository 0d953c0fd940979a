use thiserror::Error;

/// Failures raised by core logic that callers may want to match on.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unsupported file extension: {0}")]
    UnsupportedFile(String),

    #[error("Malformed structure snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
