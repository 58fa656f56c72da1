use qsync_core::{workspace_path_string, OutputArtifact};
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path};

/// Flat file name under which an artifact is cached.
///
/// The key is `<stem>_<parent hash>` followed by the extension, so equally named outputs of
/// different packages never collide. Source archives are marked with a `-src` suffix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn for_artifact(artifact: &OutputArtifact) -> Self {
        Self::for_path(&artifact.relative_path)
    }

    pub fn for_path(path: &Path) -> Self {
        let parent = path
            .parent()
            .map(workspace_path_string)
            .unwrap_or_default();
        let hash = blake3::hash(parent.as_bytes()).to_hex();
        let hash = &hash.as_str()[..16];

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path.extension().map(|e| e.to_string_lossy().into_owned());

        let (stem, source) = match stem
            .strip_suffix("-src")
            .or_else(|| stem.strip_suffix("-sources"))
        {
            Some(base) => (base.to_string(), true),
            None => (stem, false),
        };

        let key = match extension.as_deref() {
            Some("srcjar") => format!("{stem}_{hash}-src.jar"),
            Some(ext) if source => format!("{stem}_{hash}-src.{ext}"),
            Some(ext) => format!("{stem}_{hash}.{ext}"),
            None => format!("{stem}_{hash}"),
        };
        CacheKey(key)
    }

    /// Wrap an existing cache file name.
    pub fn from_file_name(name: impl Into<String>) -> Self {
        CacheKey(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
