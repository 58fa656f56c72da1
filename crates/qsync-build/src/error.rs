use crate::output_info::OutputInfo;
use qsync_core::QueryParseError;
use std::{io, path::PathBuf, time::Duration};

#[derive(Debug, thiserror::Error)]
pub enum BepError {
    #[error("build event file {path} was not written")]
    Missing { path: PathBuf },

    #[error("failed to read build event file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed build event at line {line}: {message}")]
    Malformed { line: usize, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The generated aspect file could not be written; no build was attempted.
    #[error("failed to write aspect file {path}: {source}")]
    AspectWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to run `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("build was cancelled")]
    Cancelled,

    #[error("`{command}` timed out after {timeout:?}")]
    TimedOut { command: String, timeout: Duration },

    /// The build ran to completion with a non-zero exit code. `partial` holds whatever
    /// outputs the build event stream reported.
    #[error("build failed with exit code {exit_code}")]
    BuildFailed {
        exit_code: i32,
        partial: Box<OutputInfo>,
    },

    #[error(transparent)]
    Bep(#[from] BepError),

    #[error("query failed with exit code {exit_code}:\n{stderr}")]
    QueryFailed { exit_code: i32, stderr: String },

    #[error(transparent)]
    QueryParse(#[from] QueryParseError),
}

impl BuildError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BuildError::Cancelled)
    }
}
