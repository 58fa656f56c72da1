use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};

/// A file produced by a build, as reported in the build event stream.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutputArtifact {
    /// Build-system relative path, e.g. `bazel-out/k8-fastbuild/bin/java/libfoo.jar`.
    pub relative_path: PathBuf,
    /// Where the file can be read locally.
    pub local_path: PathBuf,
    /// Freshness token: the build's content digest, or `mtime-length` when absent.
    pub digest: String,
    pub output_group: String,
}

impl OutputArtifact {
    pub fn new(
        relative_path: impl Into<PathBuf>,
        local_path: impl Into<PathBuf>,
        digest: impl Into<String>,
        output_group: impl Into<String>,
    ) -> Self {
        Self {
            relative_path: relative_path.into(),
            local_path: local_path.into(),
            digest: digest.into(),
            output_group: output_group.into(),
        }
    }

    pub fn file_name(&self) -> Option<&str> {
        self.relative_path.file_name().and_then(|name| name.to_str())
    }
}

impl fmt::Display for OutputArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.relative_path.display())
    }
}

/// Freshness token for a local file that carries no build digest.
pub fn timestamp_digest(path: &Path) -> std::io::Result<String> {
    let meta = std::fs::metadata(path)?;
    let mtime = meta
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    Ok(format!("{mtime}-{}", meta.len()))
}
