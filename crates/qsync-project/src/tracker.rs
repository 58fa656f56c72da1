use crate::{
    context::SyncContext,
    error::SyncError,
    providers::{relativize, FileRefresher},
    snapshot_holder::SnapshotHolder,
};
use parking_lot::Mutex;
use qsync_build::{BuildError, DependencyBuilder, OutputInfo};
use qsync_cache::{DependencyCache, UpdateResult};
use qsync_core::{BlazeProjectSnapshot, Label, TargetsToBuild};
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

/// Builds the external dependencies of project files and keeps the dependency cache in step.
pub struct DependencyTracker {
    workspace_root: PathBuf,
    snapshots: Arc<SnapshotHolder>,
    builder: Arc<dyn DependencyBuilder>,
    cache: Mutex<DependencyCache>,
    refresher: Arc<dyn FileRefresher>,
}

impl DependencyTracker {
    pub fn new(
        workspace_root: impl Into<PathBuf>,
        snapshots: Arc<SnapshotHolder>,
        builder: Arc<dyn DependencyBuilder>,
        cache: DependencyCache,
        refresher: Arc<dyn FileRefresher>,
    ) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            snapshots,
            builder,
            cache: Mutex::new(cache),
            refresher,
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// External dependencies of `path` that are not cached yet.
    ///
    /// `None` when there is no snapshot yet or no project target owns the file.
    pub fn get_pending_targets(&self, path: &Path) -> Option<BTreeSet<Label>> {
        let snapshot = self.snapshots.current()?;
        let path = relativize(&self.workspace_root, path)?;
        let deps = snapshot.get_file_dependencies(&path)?;
        let cached = self.cache.lock().get_cached_targets();
        Some(deps.difference(&cached).cloned().collect())
    }

    pub fn is_ready_for_analysis(&self, path: &Path) -> bool {
        self.get_pending_targets(path)
            .is_some_and(|pending| pending.is_empty())
    }

    /// Project targets to build so that `path` can be analysed.
    pub fn get_targets_to_build(&self, path: &Path) -> TargetsToBuild {
        let Some(snapshot) = self.snapshots.current() else {
            return TargetsToBuild::None;
        };
        match relativize(&self.workspace_root, path) {
            Some(path) => snapshot.targets_to_build(&path),
            None => TargetsToBuild::None,
        }
    }

    pub fn cached_targets(&self) -> BTreeSet<Label> {
        self.cache.lock().get_cached_targets()
    }

    /// Build the dependencies of every target owning one of `paths`, in a single build.
    pub fn build_dependencies_for_file(
        &self,
        ctx: &SyncContext,
        paths: &[PathBuf],
    ) -> Result<(), SyncError> {
        let snapshot = self.snapshots.current().ok_or(SyncError::NotSynced)?;

        let mut owners = BTreeSet::new();
        let mut deps = BTreeSet::new();
        for path in paths {
            let Some(relative) = relativize(&self.workspace_root, path) else {
                ctx.warn(format!("{} is outside the workspace", path.display()));
                continue;
            };
            let Some(owner) = snapshot.get_target_owner(&relative) else {
                ctx.warn(format!("No target owns {}", relative.display()));
                continue;
            };
            owners.insert(owner.clone());
            if let Some(file_deps) = snapshot.get_file_dependencies(&relative) {
                deps.extend(file_deps);
            }
        }
        self.build_and_update(ctx, &snapshot, &owners, &deps)
    }

    /// Build the dependencies of `targets`, which must be project targets.
    pub fn build_targets(
        &self,
        ctx: &SyncContext,
        targets: &BTreeSet<Label>,
    ) -> Result<(), SyncError> {
        let snapshot = self.snapshots.current().ok_or(SyncError::NotSynced)?;
        let deps = snapshot.graph().external_dependencies(targets);
        self.build_and_update(ctx, &snapshot, targets, &deps)
    }

    fn build_and_update(
        &self,
        ctx: &SyncContext,
        snapshot: &BlazeProjectSnapshot,
        targets: &BTreeSet<Label>,
        deps: &BTreeSet<Label>,
    ) -> Result<(), SyncError> {
        if targets.is_empty() {
            ctx.info("No targets to build");
            return Ok(());
        }
        ctx.info(format!(
            "Building dependencies of {} target(s)",
            targets.len()
        ));
        let definition = snapshot.project_definition();
        match self.builder.build(ctx.invocation(), definition, targets) {
            Ok(output) => self.update_cache(ctx, deps, &output),
            Err(BuildError::BuildFailed { exit_code, partial }) => {
                ctx.warn(format!(
                    "Dependency build failed with exit code {exit_code}; caching partial results"
                ));
                if !partial.targets_with_errors.is_empty() {
                    tracing::debug!(
                        target = "qsync.build",
                        targets = ?partial.targets_with_errors,
                        "targets with errors"
                    );
                }
                self.update_cache(ctx, deps, &partial)?;
                Err(SyncError::DependencyBuildFailed { exit_code })
            }
            Err(err) => Err(err.into()),
        }
    }

    fn update_cache(
        &self,
        ctx: &SyncContext,
        deps: &BTreeSet<Label>,
        output: &OutputInfo,
    ) -> Result<(), SyncError> {
        let start = Instant::now();
        let result = {
            let mut cache = self.cache.lock();
            let result = cache.update(deps, output, ctx.cancellation())?;
            cache.save_state()?;
            result
        };
        ctx.info(format!(
            "Updated cache in {} ms: updated {} artifacts, removed {} artifacts",
            start.elapsed().as_millis(),
            result.updated_files.len(),
            result.removed_keys.len()
        ));
        self.refresh(result);
        Ok(())
    }

    /// Build render jars for the targets owning `paths`.
    pub fn build_render_jar(&self, ctx: &SyncContext, paths: &[PathBuf]) -> Result<(), SyncError> {
        let snapshot = self.snapshots.current().ok_or(SyncError::NotSynced)?;
        let owners = paths
            .iter()
            .filter_map(|path| relativize(&self.workspace_root, path))
            .filter_map(|path| snapshot.get_target_owner(&path).cloned())
            .collect::<BTreeSet<_>>();
        if owners.is_empty() {
            ctx.warn("No targets own the requested files; nothing to render");
            return Ok(());
        }

        let jars =
            self.builder
                .build_render_jar(ctx.invocation(), snapshot.project_definition(), &owners)?;
        let result = {
            let mut cache = self.cache.lock();
            let result = cache.update_render_jars(&jars, ctx.cancellation())?;
            cache.save_state()?;
            result
        };
        ctx.info(format!("Cached {} render jar(s)", result.updated_files.len()));
        self.refresh(result);
        Ok(())
    }

    /// Delete every cached artifact.
    pub fn reset_cache(&self, ctx: &SyncContext) -> Result<(), SyncError> {
        self.cache.lock().clear()?;
        ctx.info("Dependency cache cleared");
        Ok(())
    }

    fn refresh(&self, result: UpdateResult) {
        if !result.updated_files.is_empty() {
            self.refresher.refresh_files(result.updated_files);
        }
    }
}

impl std::fmt::Debug for DependencyTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyTracker")
            .field("workspace_root", &self.workspace_root)
            .finish_non_exhaustive()
    }
}
