//! Collaborators the engine consumes: the project definition, version control state and
//! file refresh notifications.

use crate::{context::SyncContext, error::SyncError};
use qsync_core::{ProjectDefinition, VcsState};
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};
use tokio::sync::mpsc;

/// Supplies the current project definition. Called on load and before each sync to detect
/// boundary changes.
pub trait ProjectDefinitionProvider: Send + Sync {
    fn project_definition(&self) -> Result<ProjectDefinition, SyncError>;
}

impl ProjectDefinitionProvider for ProjectDefinition {
    fn project_definition(&self) -> Result<ProjectDefinition, SyncError> {
        Ok(self.clone())
    }
}

/// Re-reads the workspace configuration on every call.
#[derive(Debug, Clone)]
pub struct ConfigDefinitionProvider {
    workspace_root: PathBuf,
}

impl ConfigDefinitionProvider {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
        }
    }
}

impl ProjectDefinitionProvider for ConfigDefinitionProvider {
    fn project_definition(&self) -> Result<ProjectDefinition, SyncError> {
        let (config, _) = qsync_config::load_for_workspace(&self.workspace_root)?;
        Ok(config.project_definition()?)
    }
}

/// Version control state of the workspace. `Ok(None)` means unknown, which forces full
/// queries.
pub trait VcsStateProvider: Send + Sync {
    fn vcs_state(&self, ctx: &SyncContext) -> Result<Option<VcsState>, SyncError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoVcs;

impl VcsStateProvider for NoVcs {
    fn vcs_state(&self, _ctx: &SyncContext) -> Result<Option<VcsState>, SyncError> {
        Ok(None)
    }
}

/// Told which files changed on disk after a cache update. Must not block.
pub trait FileRefresher: Send + Sync {
    fn refresh_files(&self, paths: BTreeSet<PathBuf>);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFileRefresher;

impl FileRefresher for NoopFileRefresher {
    fn refresh_files(&self, paths: BTreeSet<PathBuf>) {
        tracing::debug!(target = "qsync.cache", count = paths.len(), "files updated");
    }
}

/// Hands refresh requests to a consumer on another thread.
#[derive(Debug, Clone)]
pub struct ChannelFileRefresher {
    sender: mpsc::UnboundedSender<BTreeSet<PathBuf>>,
}

impl ChannelFileRefresher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BTreeSet<PathBuf>>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl FileRefresher for ChannelFileRefresher {
    fn refresh_files(&self, paths: BTreeSet<PathBuf>) {
        if self.sender.send(paths).is_err() {
            tracing::debug!(target = "qsync.cache", "file refresh receiver dropped");
        }
    }
}

/// Workspace-relative form of `path`, or `None` when it lies outside the workspace.
pub(crate) fn relativize(workspace_root: &Path, path: &Path) -> Option<PathBuf> {
    if path.is_absolute() {
        path.strip_prefix(workspace_root)
            .ok()
            .map(qsync_core::normalize_workspace_path)
    } else {
        Some(qsync_core::normalize_workspace_path(path))
    }
}
