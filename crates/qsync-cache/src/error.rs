use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors produced by cache management and persistence.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error in {path}: {message}")]
    Json { path: PathBuf, message: String },

    #[error("cache update cancelled")]
    Cancelled,
}
