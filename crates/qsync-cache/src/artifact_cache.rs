use crate::{
    cache_key::CacheKey,
    error::Result,
    pool::CopyPool,
    util::{copy_atomic, read_json, remove_file_best_effort, write_json, TMP_MARKER},
};
use qsync_core::OutputArtifact;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs, io,
    path::{Path, PathBuf},
};
use tokio_util::sync::CancellationToken;

/// Per-directory record of the digest each cached file was copied from.
pub const STATE_FILE: &str = ".qsync-cache-state.json";

const STATE_VERSION: u32 = 1;

/// A file to place in the cache under `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheItem {
    pub key: CacheKey,
    pub source: PathBuf,
    pub digest: String,
}

impl CacheItem {
    pub fn for_artifact(artifact: &OutputArtifact) -> Self {
        Self {
            key: CacheKey::for_artifact(artifact),
            source: artifact.local_path.clone(),
            digest: artifact.digest.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshResult {
    /// Cache paths written by this refresh.
    pub updated: BTreeSet<PathBuf>,
    pub removed: BTreeSet<CacheKey>,
    /// Some copies were skipped because the refresh was cancelled.
    pub cancelled: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheState {
    version: u32,
    entries: BTreeMap<CacheKey, String>,
}

/// A flat directory of cached build outputs, each stored under its [`CacheKey`].
#[derive(Debug)]
pub struct ArtifactCache {
    dir: PathBuf,
    pool: CopyPool,
    digests: BTreeMap<CacheKey, String>,
}

impl ArtifactCache {
    /// Open `dir`, loading the recorded digests. A missing or unreadable state file starts empty,
    /// which makes the next refresh copy everything again.
    pub fn open(dir: impl Into<PathBuf>, pool: CopyPool) -> Self {
        let dir = dir.into();
        let state_path = dir.join(STATE_FILE);
        let digests = match read_json::<CacheState>(&state_path) {
            Ok(Some(state)) if state.version == STATE_VERSION => state.entries,
            Ok(Some(state)) => {
                tracing::debug!(
                    target = "qsync.cache",
                    path = %state_path.display(),
                    found = state.version,
                    expected = STATE_VERSION,
                    "ignoring cache state with a different version"
                );
                BTreeMap::new()
            }
            Ok(None) => BTreeMap::new(),
            Err(err) => {
                tracing::warn!(
                    target = "qsync.cache",
                    path = %state_path.display(),
                    error = %err,
                    "failed to read cache state"
                );
                BTreeMap::new()
            }
        };
        Self { dir, pool, digests }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.as_str())
    }

    /// The cached file for `key`, if present on disk.
    pub fn get(&self, key: &CacheKey) -> Option<PathBuf> {
        let path = self.path_for(key);
        path.is_file().then_some(path)
    }

    pub fn digest(&self, key: &CacheKey) -> Option<&str> {
        self.digests.get(key).map(String::as_str)
    }

    /// Bring the directory in line with `artifacts`.
    ///
    /// Files that are missing or whose recorded digest differs are copied. With
    /// `remove_missing`, files that are neither in `artifacts` nor in `keep` are deleted.
    /// Per-file failures are logged and skipped.
    pub fn refresh(
        &mut self,
        artifacts: &[CacheItem],
        keep: &BTreeSet<CacheKey>,
        remove_missing: bool,
        cancel: &CancellationToken,
    ) -> RefreshResult {
        let existing = match fs::create_dir_all(&self.dir).and_then(|()| list_files(&self.dir)) {
            Ok(existing) => existing,
            Err(err) => {
                tracing::warn!(
                    target = "qsync.cache",
                    dir = %self.dir.display(),
                    error = %err,
                    "failed to enumerate cache directory"
                );
                return RefreshResult::default();
            }
        };

        let wanted = artifacts
            .iter()
            .map(|item| (&item.key, item))
            .collect::<BTreeMap<_, _>>();
        let to_copy = wanted
            .values()
            .filter(|item| {
                !existing.contains(&item.key)
                    || self.digests.get(&item.key) != Some(&item.digest)
            })
            .copied()
            .collect::<Vec<_>>();

        let dir = &self.dir;
        let copied = self.pool.filter_map(&to_copy, |item| {
            if cancel.is_cancelled() {
                return None;
            }
            let dest = dir.join(item.key.as_str());
            match copy_atomic(&item.source, &dest) {
                Ok(()) => Some((item.key.clone(), item.digest.clone(), dest)),
                Err(err) => {
                    tracing::warn!(
                        target = "qsync.cache",
                        source = %item.source.display(),
                        dest = %dest.display(),
                        error = %err,
                        "failed to copy artifact into cache"
                    );
                    None
                }
            }
        });

        let mut result = RefreshResult::default();
        for (key, digest, dest) in copied {
            self.digests.insert(key, digest);
            result.updated.insert(dest);
        }

        if cancel.is_cancelled() {
            tracing::info!(
                target = "qsync.cache",
                dir = %self.dir.display(),
                copied = result.updated.len(),
                requested = to_copy.len(),
                "cache refresh cancelled; skipping remaining work"
            );
            result.cancelled = true;
            return result;
        }

        if remove_missing {
            let stale = existing
                .iter()
                .filter(|key| !wanted.contains_key(key) && !keep.contains(*key))
                .collect::<Vec<_>>();
            let removed = self.pool.filter_map(&stale, |key| {
                remove_file_best_effort(&dir.join(key.as_str()), "refresh.stale")
                    .then(|| (*key).clone())
            });
            for key in &removed {
                self.digests.remove(key);
            }
            result.removed.extend(removed);
        }

        tracing::debug!(
            target = "qsync.cache",
            dir = %self.dir.display(),
            updated = result.updated.len(),
            removed = result.removed.len(),
            "refreshed cache directory"
        );
        result
    }

    /// Forget a set of keys and delete their files.
    pub fn remove(&mut self, keys: &BTreeSet<CacheKey>) -> BTreeSet<CacheKey> {
        let keys = keys.iter().collect::<Vec<_>>();
        let dir = &self.dir;
        let removed = self.pool.filter_map(&keys, |key| {
            remove_file_best_effort(&dir.join(key.as_str()), "remove")
                .then(|| (*key).clone())
        });
        for key in &removed {
            self.digests.remove(key);
        }
        removed.into_iter().collect()
    }

    pub fn save_state(&self) -> Result<()> {
        let state = CacheState {
            version: STATE_VERSION,
            entries: self.digests.clone(),
        };
        write_json(&self.dir.join(STATE_FILE), &state)
    }

    /// Delete the directory and everything in it.
    pub fn clear(&mut self) -> Result<()> {
        self.digests.clear();
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn list_files(dir: &Path) -> io::Result<BTreeSet<CacheKey>> {
    let mut keys = BTreeSet::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == STATE_FILE {
            continue;
        }
        if name.contains(TMP_MARKER) {
            // Leftover from an interrupted copy.
            remove_file_best_effort(&entry.path(), "list_files.tmp");
            continue;
        }
        keys.insert(CacheKey::from_file_name(name));
    }
    Ok(keys)
}
