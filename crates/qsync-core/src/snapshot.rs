use crate::{
    graph::BuildGraph,
    label::Label,
    languages::LanguageRegistry,
    project_definition::ProjectDefinition,
    query_summary::{is_build_file_name, QuerySummary},
    targets_to_build::TargetsToBuild,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::Arc,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOperation {
    Add,
    Modify,
    Delete,
}

/// A locally modified file, relative to the workspace root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkspaceFileChange {
    pub operation: FileOperation,
    pub path: PathBuf,
}

impl WorkspaceFileChange {
    pub fn new(operation: FileOperation, path: impl Into<PathBuf>) -> Self {
        Self {
            operation,
            path: path.into(),
        }
    }
}

/// Version-control state at the time of a query: the upstream revision plus the working set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcsState {
    pub upstream_revision: String,
    #[serde(default)]
    pub working_set: BTreeSet<WorkspaceFileChange>,
}

/// The durable sync state: everything needed to rebuild a snapshot after a restart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostQuerySyncData {
    pub project_definition: ProjectDefinition,
    #[serde(default)]
    pub vcs_state: Option<VcsState>,
    pub query_summary: QuerySummary,
}

impl PostQuerySyncData {
    pub fn new(
        project_definition: ProjectDefinition,
        vcs_state: Option<VcsState>,
        query_summary: QuerySummary,
    ) -> Self {
        Self {
            project_definition,
            vcs_state,
            query_summary,
        }
    }
}

/// An immutable, fully resolved view of the project.
///
/// Snapshots are never mutated; every sync builds a new one and swaps it in.
#[derive(Debug, Clone)]
pub struct BlazeProjectSnapshot {
    query_data: Arc<PostQuerySyncData>,
    graph: BuildGraph,
}

impl BlazeProjectSnapshot {
    pub fn query_data(&self) -> &PostQuerySyncData {
        &self.query_data
    }

    pub fn project_definition(&self) -> &ProjectDefinition {
        &self.query_data.project_definition
    }

    pub fn graph(&self) -> &BuildGraph {
        &self.graph
    }

    pub fn get_target_owner(&self, path: &Path) -> Option<&Label> {
        self.graph.get_target_owner(path)
    }

    pub fn get_file_dependencies(&self, path: &Path) -> Option<BTreeSet<Label>> {
        self.graph.get_file_dependencies(path)
    }

    pub fn get_targets_depending_on(&self, targets: &BTreeSet<Label>) -> BTreeSet<Label> {
        self.graph.get_targets_depending_on(targets)
    }

    /// Which project targets to build to make `path` (workspace-relative) analysable.
    pub fn targets_to_build(&self, path: &Path) -> TargetsToBuild {
        let is_build_file = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(is_build_file_name);
        if is_build_file {
            let package = path.parent().unwrap_or(Path::new(""));
            return match self.graph.targets_in_package(package) {
                Some(targets) => TargetsToBuild::BuildFile(targets.clone()),
                None => TargetsToBuild::None,
            };
        }
        match self.graph.get_target_owner(path) {
            Some(owner) => TargetsToBuild::SourceFile(BTreeSet::from([owner.clone()])),
            None => TargetsToBuild::None,
        }
    }
}

/// Builds snapshots from query data using the registered language support.
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    registry: LanguageRegistry,
}

impl SnapshotBuilder {
    pub fn new(registry: LanguageRegistry) -> Self {
        Self { registry }
    }

    pub fn create(&self, data: PostQuerySyncData) -> BlazeProjectSnapshot {
        let graph = BuildGraph::build(
            &data.query_summary,
            &data.project_definition,
            &self.registry,
        );
        BlazeProjectSnapshot {
            query_data: Arc::new(data),
            graph,
        }
    }
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new(LanguageRegistry::with_defaults())
    }
}
