use crate::{
    artifact_cache::{ArtifactCache, CacheItem},
    cache_key::CacheKey,
    error::{CacheError, Result},
    pool::CopyPool,
    util::{read_json, write_json},
};
use qsync_build::{ArtifactKind, OutputInfo};
use qsync_core::{Label, OutputArtifact};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs, io,
    path::{Path, PathBuf},
};
use tokio_util::sync::CancellationToken;

/// Target to cache-key index, relative to the cache root.
pub const DEPENDENCY_STATE_FILE: &str = "dependency_cache.json";
/// Sub-directory holding render jars.
pub const RENDER_JARS_DIR: &str = "render_jars";

const STATE_VERSION: u32 = 1;

/// One cached output of a target.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CachedArtifact {
    pub kind: ArtifactKind,
    pub key: CacheKey,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub updated_files: BTreeSet<PathBuf>,
    /// Cached files deleted because no target references them any more.
    pub removed_keys: BTreeSet<CacheKey>,
}

impl UpdateResult {
    pub fn is_empty(&self) -> bool {
        self.updated_files.is_empty() && self.removed_keys.is_empty()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DependencyState {
    version: u32,
    targets: BTreeMap<Label, BTreeSet<CachedArtifact>>,
}

/// Tracks which targets have their build outputs cached, and where.
///
/// Mutation takes `&mut self`; callers sharing a cache serialize updates behind a lock.
#[derive(Debug)]
pub struct DependencyCache {
    root: PathBuf,
    caches: BTreeMap<ArtifactKind, ArtifactCache>,
    render_jars: ArtifactCache,
    targets: BTreeMap<Label, BTreeSet<CachedArtifact>>,
}

impl DependencyCache {
    /// Open the cache rooted at `root`. Unreadable state is logged and treated as empty.
    pub fn open(root: impl Into<PathBuf>, pool: CopyPool) -> Self {
        let root = root.into();
        let caches = ArtifactKind::ALL
            .into_iter()
            .map(|kind| {
                (
                    kind,
                    ArtifactCache::open(root.join(kind.dir_name()), pool.clone()),
                )
            })
            .collect();
        let render_jars = ArtifactCache::open(root.join(RENDER_JARS_DIR), pool);

        let state_path = root.join(DEPENDENCY_STATE_FILE);
        let targets = match read_json::<DependencyState>(&state_path) {
            Ok(Some(state)) if state.version == STATE_VERSION => state.targets,
            Ok(Some(_)) | Ok(None) => BTreeMap::new(),
            Err(err) => {
                tracing::warn!(
                    target = "qsync.cache",
                    path = %state_path.display(),
                    error = %err,
                    "failed to read dependency cache state"
                );
                BTreeMap::new()
            }
        };

        Self {
            root,
            caches,
            render_jars,
            targets,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Merge the outputs of a dependency build.
    ///
    /// Targets present in `output` have their artifacts replaced. Targets in `targets` that
    /// produced nothing are dropped. Every other target is left alone. Files that no target
    /// references any more are deleted.
    pub fn update(
        &mut self,
        targets: &BTreeSet<Label>,
        output: &OutputInfo,
        cancel: &CancellationToken,
    ) -> Result<UpdateResult> {
        let mut next = self.targets.clone();
        for label in targets {
            if !output.artifacts.contains_key(label) {
                next.remove(label);
            }
        }
        let mut items: BTreeMap<ArtifactKind, Vec<CacheItem>> = BTreeMap::new();
        for (label, artifacts) in &output.artifacts {
            let mut cached = BTreeSet::new();
            for artifact in artifacts {
                let item = CacheItem::for_artifact(&artifact.artifact);
                cached.insert(CachedArtifact {
                    kind: artifact.kind,
                    key: item.key.clone(),
                });
                items.entry(artifact.kind).or_default().push(item);
            }
            next.insert(label.clone(), cached);
        }
        if !output.unattributed.is_empty() {
            tracing::debug!(
                target = "qsync.cache",
                count = output.unattributed.len(),
                "not caching artifacts without an owning target"
            );
        }

        // Copy everything first so a cancelled update deletes nothing.
        let mut result = UpdateResult::default();
        for (kind, cache) in &mut self.caches {
            let wanted = items.get(kind).map(Vec::as_slice).unwrap_or(&[]);
            let refreshed = cache.refresh(wanted, &BTreeSet::new(), false, cancel);
            result.updated_files.extend(refreshed.updated);
            if refreshed.cancelled {
                return Err(CacheError::Cancelled);
            }
        }

        // The second pass retries copies that failed above. Only files actually written or
        // deleted are reported.
        let referenced = referenced_keys(&next);
        for (kind, cache) in &mut self.caches {
            let keep = referenced.get(kind).cloned().unwrap_or_default();
            let wanted = items.get(kind).map(Vec::as_slice).unwrap_or(&[]);
            let pruned = cache.refresh(wanted, &keep, true, &CancellationToken::new());
            result.updated_files.extend(pruned.updated);
            result.removed_keys.extend(pruned.removed);
        }

        self.targets = next;
        Ok(result)
    }

    /// Cache render jars next to the dependency outputs. Earlier render jars are kept.
    pub fn update_render_jars(
        &mut self,
        artifacts: &[OutputArtifact],
        cancel: &CancellationToken,
    ) -> Result<UpdateResult> {
        let items = artifacts
            .iter()
            .map(CacheItem::for_artifact)
            .collect::<Vec<_>>();
        let refreshed = self
            .render_jars
            .refresh(&items, &BTreeSet::new(), false, cancel);
        if refreshed.cancelled {
            return Err(CacheError::Cancelled);
        }
        Ok(UpdateResult {
            updated_files: refreshed.updated,
            removed_keys: BTreeSet::new(),
        })
    }

    pub fn get_cached_targets(&self) -> BTreeSet<Label> {
        self.targets.keys().cloned().collect()
    }

    pub fn artifacts_for(&self, label: &Label) -> Option<&BTreeSet<CachedArtifact>> {
        self.targets.get(label)
    }

    /// The cached file stored under `key`, in whichever directory holds it.
    pub fn get_cached_artifact(&self, key: &CacheKey) -> Option<PathBuf> {
        self.caches
            .values()
            .chain(std::iter::once(&self.render_jars))
            .find_map(|cache| cache.get(key))
    }

    /// Where `artifact` is cached, if it is.
    pub fn cached_path(&self, artifact: &OutputArtifact) -> Option<PathBuf> {
        self.get_cached_artifact(&CacheKey::for_artifact(artifact))
    }

    pub fn save_state(&self) -> Result<()> {
        for cache in self.caches.values().chain(std::iter::once(&self.render_jars)) {
            cache.save_state()?;
        }
        let state = DependencyState {
            version: STATE_VERSION,
            targets: self.targets.clone(),
        };
        write_json(&self.root.join(DEPENDENCY_STATE_FILE), &state)
    }

    /// Forget every target and delete all cached files.
    pub fn clear(&mut self) -> Result<()> {
        self.targets.clear();
        for cache in self.caches.values_mut() {
            cache.clear()?;
        }
        self.render_jars.clear()?;
        match fs::remove_file(self.root.join(DEPENDENCY_STATE_FILE)) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        tracing::info!(
            target = "qsync.cache",
            root = %self.root.display(),
            "cleared dependency cache"
        );
        Ok(())
    }
}

fn referenced_keys(
    targets: &BTreeMap<Label, BTreeSet<CachedArtifact>>,
) -> BTreeMap<ArtifactKind, BTreeSet<CacheKey>> {
    let mut keys: BTreeMap<ArtifactKind, BTreeSet<CacheKey>> = BTreeMap::new();
    for artifact in targets.values().flatten() {
        keys.entry(artifact.kind)
            .or_default()
            .insert(artifact.key.clone());
    }
    keys
}
