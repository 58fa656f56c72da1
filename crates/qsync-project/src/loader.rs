use crate::{
    context::SyncContext,
    error::SyncError,
    project::QuerySyncProject,
    providers::{
        ConfigDefinitionProvider, FileRefresher, NoopFileRefresher, ProjectDefinitionProvider,
        VcsStateProvider,
    },
    refresher::ProjectRefresher,
    snapshot_holder::SnapshotHolder,
    store::SyncStateStore,
    tracker::DependencyTracker,
    vcs::GitVcsStateProvider,
};
use qsync_build::{
    BazelDependencyBuilder, BazelQueryRunner, BuildInvoker, CommandRunner, DefaultCommandRunner,
    DependencyBuilder, InvokerSettings, QueryRunner,
};
use qsync_cache::{CopyPool, DependencyCache};
use qsync_config::QsyncConfig;
use qsync_core::{LanguageRegistry, SnapshotBuilder};
use std::{path::PathBuf, sync::Arc};

/// Everything a project is built from. Tests substitute fakes for the build tool.
#[derive(Clone)]
pub struct ProjectComponents {
    pub workspace_root: PathBuf,
    /// Where the persisted query state lives.
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub definition: Arc<dyn ProjectDefinitionProvider>,
    pub query: Arc<dyn QueryRunner>,
    pub builder: Arc<dyn DependencyBuilder>,
    pub vcs: Arc<dyn VcsStateProvider>,
    pub refresher: Arc<dyn FileRefresher>,
    pub copy_pool: CopyPool,
    pub registry: LanguageRegistry,
}

/// Creates [`QuerySyncProject`]s. The snapshot holder outlives individual loads so listeners
/// stay registered across reloads.
pub struct ProjectLoader {
    components: ProjectComponents,
    snapshots: Arc<SnapshotHolder>,
}

impl ProjectLoader {
    pub fn new(components: ProjectComponents) -> Self {
        Self {
            components,
            snapshots: Arc::new(SnapshotHolder::new()),
        }
    }

    /// Wire the real build tool, git and the configured directories.
    pub fn from_config(workspace_root: impl Into<PathBuf>, config: &QsyncConfig) -> Self {
        let workspace_root = workspace_root.into();
        let runner: Arc<dyn CommandRunner> = Arc::new(DefaultCommandRunner);
        let settings = InvokerSettings {
            binary: config.build.binary.clone(),
            build_flags: config.build.build_flags.clone(),
            query_flags: config.build.query_flags.clone(),
            timeout: config.build.timeout(),
        };
        let invoker = BuildInvoker::new(&workspace_root, settings, runner.clone());

        Self::new(ProjectComponents {
            data_dir: config.data_dir(&workspace_root),
            cache_dir: config.cache_dir(&workspace_root),
            definition: Arc::new(ConfigDefinitionProvider::new(&workspace_root)),
            query: Arc::new(BazelQueryRunner::new(invoker.clone())),
            builder: Arc::new(BazelDependencyBuilder::new(invoker)),
            vcs: Arc::new(GitVcsStateProvider::new(&workspace_root, runner)),
            refresher: Arc::new(NoopFileRefresher),
            copy_pool: CopyPool::new(config.cache.copy_threads()),
            registry: LanguageRegistry::with_defaults(),
            workspace_root,
        })
    }

    pub fn components(&self) -> &ProjectComponents {
        &self.components
    }

    /// Replace the file refresher used by projects loaded from now on.
    pub fn set_file_refresher(&mut self, refresher: Arc<dyn FileRefresher>) {
        self.components.refresher = refresher;
    }

    pub fn snapshots(&self) -> &Arc<SnapshotHolder> {
        &self.snapshots
    }

    /// Read the current definition and assemble a project around it. Nothing is queried yet.
    pub fn load_project(&self, ctx: &SyncContext) -> Result<QuerySyncProject, SyncError> {
        let c = &self.components;
        let definition = c.definition.project_definition()?;
        if definition.include_directories.is_empty() {
            return Err(SyncError::Definition(
                "no project directories are included".to_string(),
            ));
        }
        let supported = c.registry.supported_languages();
        if let Some(language) = definition
            .language_classes
            .iter()
            .find(|language| !supported.contains(*language))
        {
            return Err(SyncError::Definition(format!(
                "no support registered for language {}",
                language.as_str()
            )));
        }

        let cache = DependencyCache::open(&c.cache_dir, c.copy_pool.clone());
        let tracker = Arc::new(DependencyTracker::new(
            &c.workspace_root,
            self.snapshots.clone(),
            c.builder.clone(),
            cache,
            c.refresher.clone(),
        ));
        ctx.info(format!(
            "Loaded project with {} included director{}",
            definition.include_directories.len(),
            if definition.include_directories.len() == 1 { "y" } else { "ies" }
        ));

        Ok(QuerySyncProject::new(
            c.workspace_root.clone(),
            definition,
            c.definition.clone(),
            c.vcs.clone(),
            ProjectRefresher::new(c.query.clone()),
            SyncStateStore::new(&c.data_dir),
            SnapshotBuilder::new(c.registry.clone()),
            self.snapshots.clone(),
            tracker,
        ))
    }
}
