use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the submission cache
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to persist cache to {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Submission data cannot be fingerprinted: {0}")]
    Fingerprint(#[source] serde_json::Error),

    #[error("Invalid submission key: {0}")]
    InvalidKey(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;
