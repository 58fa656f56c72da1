use qsync_build::BuildError;
use qsync_cache::CacheError;
use qsync_config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// No snapshot exists yet, so dependency questions cannot be answered.
    #[error("Sync is not yet complete")]
    NotSynced,

    /// An operation that needs a loaded project was submitted before loading.
    #[error("project is not loaded")]
    ProjectNotLoaded,

    #[error("operation was cancelled")]
    Cancelled,

    #[error("invalid project definition: {0}")]
    Definition(String),

    /// The dependency build exited non-zero; whatever it produced was cached.
    #[error("dependency build failed with exit code {exit_code}")]
    DependencyBuildFailed { exit_code: i32 },

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("version control query failed: {0}")]
    Vcs(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            SyncError::Cancelled => true,
            SyncError::Build(err) => err.is_cancelled(),
            SyncError::Cache(CacheError::Cancelled) => true,
            _ => false,
        }
    }
}
