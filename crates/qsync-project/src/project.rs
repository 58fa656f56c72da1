use crate::{
    context::SyncContext,
    error::SyncError,
    providers::{ProjectDefinitionProvider, VcsStateProvider},
    refresher::ProjectRefresher,
    snapshot_holder::SnapshotHolder,
    store::SyncStateStore,
    tracker::DependencyTracker,
};
use qsync_core::{
    BlazeProjectSnapshot, Label, PostQuerySyncData, ProjectDefinition, SnapshotBuilder,
    TargetsToBuild,
};
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::Arc,
};

/// A loaded project: its definition, the snapshot lifecycle and the dependency tracker.
pub struct QuerySyncProject {
    workspace_root: PathBuf,
    definition: ProjectDefinition,
    definition_provider: Arc<dyn ProjectDefinitionProvider>,
    vcs: Arc<dyn VcsStateProvider>,
    refresher: ProjectRefresher,
    store: SyncStateStore,
    snapshot_builder: SnapshotBuilder,
    snapshots: Arc<SnapshotHolder>,
    tracker: Arc<DependencyTracker>,
}

impl QuerySyncProject {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        workspace_root: PathBuf,
        definition: ProjectDefinition,
        definition_provider: Arc<dyn ProjectDefinitionProvider>,
        vcs: Arc<dyn VcsStateProvider>,
        refresher: ProjectRefresher,
        store: SyncStateStore,
        snapshot_builder: SnapshotBuilder,
        snapshots: Arc<SnapshotHolder>,
        tracker: Arc<DependencyTracker>,
    ) -> Self {
        Self {
            workspace_root,
            definition,
            definition_provider,
            vcs,
            refresher,
            store,
            snapshot_builder,
            snapshots,
            tracker,
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn project_definition(&self) -> &ProjectDefinition {
        &self.definition
    }

    pub fn snapshot(&self) -> Option<Arc<BlazeProjectSnapshot>> {
        self.snapshots.current()
    }

    pub fn dependency_tracker(&self) -> &Arc<DependencyTracker> {
        &self.tracker
    }

    /// Publish the snapshot persisted by an earlier session, if it matches this project.
    pub fn read_snapshot_from_disk(
        &self,
        ctx: &SyncContext,
    ) -> Result<Option<Arc<BlazeProjectSnapshot>>, SyncError> {
        let Some(data) = self.store.load()? else {
            return Ok(None);
        };
        if data.project_definition != self.definition {
            ctx.info("Stored sync state belongs to a different project definition");
            return Ok(None);
        }
        let snapshot = Arc::new(self.snapshot_builder.create(data));
        self.snapshots.set(snapshot.clone());
        tracing::debug!(
            target = "qsync.sync",
            path = %self.store.path().display(),
            "restored snapshot from disk"
        );
        Ok(Some(snapshot))
    }

    /// Query the project, as a delta from `last` when possible, and publish a new snapshot.
    pub fn sync(
        &self,
        ctx: &SyncContext,
        last: Option<&PostQuerySyncData>,
    ) -> Result<(), SyncError> {
        let vcs_state = match self.vcs.vcs_state(ctx) {
            Ok(state) => state,
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => {
                ctx.warn(format!("Could not read version control state: {err}"));
                None
            }
        };

        let data = self.refresher.refresh(ctx, last, &self.definition, vcs_state)?;
        if ctx.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        self.store.save(&data)?;

        let snapshot = Arc::new(self.snapshot_builder.create(data));
        let targets = snapshot.graph().project_targets().count();
        let files = snapshot.graph().source_file_count();
        self.snapshots.set(snapshot);
        ctx.info(format!(
            "Sync complete: {targets} project targets, {files} source files"
        ));
        Ok(())
    }

    pub fn full_sync(&self, ctx: &SyncContext) -> Result<(), SyncError> {
        self.sync(ctx, None)
    }

    /// Sync relative to the current snapshot, or the stored state when nothing is loaded.
    pub fn delta_sync(&self, ctx: &SyncContext) -> Result<(), SyncError> {
        match self.snapshots.current() {
            Some(snapshot) => self.sync(ctx, Some(snapshot.query_data())),
            None => {
                let stored = self.store.load()?;
                self.sync(ctx, stored.as_ref())
            }
        }
    }

    /// Build the dependencies of `targets` so their files can be analysed.
    pub fn enable_analysis(
        &self,
        ctx: &SyncContext,
        targets: &BTreeSet<Label>,
    ) -> Result<(), SyncError> {
        self.tracker.build_targets(ctx, targets)
    }

    pub fn enable_render_jar(&self, ctx: &SyncContext, paths: &[PathBuf]) -> Result<(), SyncError> {
        self.tracker.build_render_jar(ctx, paths)
    }

    /// Whether the definition this project was loaded with is still the configured one.
    pub fn is_definition_current(&self) -> Result<bool, SyncError> {
        Ok(self.definition_provider.project_definition()? == self.definition)
    }

    pub fn get_project_targets(&self, path: &Path) -> TargetsToBuild {
        self.tracker.get_targets_to_build(path)
    }

    pub fn can_enable_analysis_for(&self, path: &Path) -> bool {
        !self.get_project_targets(path).is_empty()
    }

    pub fn get_targets_depending_on(&self, targets: &BTreeSet<Label>) -> BTreeSet<Label> {
        self.snapshots
            .current()
            .map(|snapshot| snapshot.get_targets_depending_on(targets))
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for QuerySyncProject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuerySyncProject")
            .field("workspace_root", &self.workspace_root)
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}
