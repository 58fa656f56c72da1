//! Query-based project sync.
//!
//! A [`QuerySyncManager`] owns the loaded [`QuerySyncProject`] and runs sync and build
//! operations on its worker thread. Each sync queries the build tool (in full, or only the
//! packages touched since the last sync) and publishes a new immutable snapshot. The
//! [`DependencyTracker`] builds the external dependencies of project files and merges the
//! outputs into the dependency cache.

mod context;
mod error;
mod loader;
mod manager;
mod project;
mod providers;
mod refresher;
mod snapshot_holder;
mod status;
mod store;
mod tracker;
mod vcs;

pub use crate::{
    context::{OutputKind, OutputSink, PrintOutput, SyncContext},
    error::SyncError,
    loader::{ProjectComponents, ProjectLoader},
    manager::{ProjectState, QuerySyncManager, SyncTask},
    project::QuerySyncProject,
    providers::{
        ChannelFileRefresher, ConfigDefinitionProvider, FileRefresher, NoVcs, NoopFileRefresher,
        ProjectDefinitionProvider, VcsStateProvider,
    },
    refresher::ProjectRefresher,
    snapshot_holder::{SnapshotHolder, SnapshotListener},
    status::{DefaultSyncStatus, SyncMode, SyncResult, SyncStatus, TaskOrigin},
    store::{SyncStateStore, SYNC_STATE_FILE},
    tracker::DependencyTracker,
    vcs::{parse_porcelain, GitVcsStateProvider},
};
