//! Decide how much of the project has to be re-queried after local changes.

use crate::{
    project_definition::{workspace_path_string, ProjectDefinition},
    query_summary::{is_build_file_name, QuerySummary},
    snapshot::{FileOperation, PostQuerySyncData, VcsState, WorkspaceFileChange},
};
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

/// Name of the generated aspect file written at the workspace root before dependency builds.
///
/// It is a build input, so changes to it must never be treated as project edits.
pub const GENERATED_ASPECT_FILE: &str = ".aswb.bzl";

/// Packages touched by a set of file changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AffectedPackages {
    pub modified: BTreeSet<PathBuf>,
    pub deleted: BTreeSet<PathBuf>,
    /// Set when a change cannot be attributed to a package (for example a `.bzl` edit).
    pub requires_full_query: bool,
    /// Added or deleted source files for which no enclosing package is known.
    pub unowned_files: BTreeSet<PathBuf>,
}

impl AffectedPackages {
    pub fn is_empty(&self) -> bool {
        self.modified.is_empty() && self.deleted.is_empty() && !self.requires_full_query
    }

    /// Query expression for the modified packages, or `None` when nothing needs querying.
    pub fn query_expression(&self) -> Option<String> {
        if self.modified.is_empty() {
            return None;
        }
        Some(
            self.modified
                .iter()
                .map(|package| format!("//{}:*", workspace_path_string(package)))
                .collect::<Vec<_>>()
                .join(" + "),
        )
    }
}

pub fn affected_packages<'a>(
    changes: impl IntoIterator<Item = &'a WorkspaceFileChange>,
    summary: &QuerySummary,
    definition: &ProjectDefinition,
) -> AffectedPackages {
    let mut affected = AffectedPackages::default();
    // Packages whose globs gain or lose files when a subpackage appears or disappears.
    let mut parents = BTreeSet::new();

    for change in changes {
        let path = change.path.as_path();
        if path == Path::new(GENERATED_ASPECT_FILE) || !definition.is_included(path) {
            continue;
        }
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();

        if is_build_file_name(file_name) {
            let package = path.parent().unwrap_or(Path::new("")).to_path_buf();
            if change.operation != FileOperation::Modify {
                if let Some(parent) = summary.package_for_path(&package) {
                    parents.insert(parent.to_path_buf());
                }
            }
            match change.operation {
                FileOperation::Delete => {
                    affected.modified.remove(&package);
                    affected.deleted.insert(package);
                }
                FileOperation::Add | FileOperation::Modify => {
                    affected.deleted.remove(&package);
                    affected.modified.insert(package);
                }
            }
            continue;
        }

        if file_name.ends_with(".bzl") {
            tracing::debug!(
                target = "qsync.delta",
                path = %path.display(),
                "starlark file changed; a full query is required"
            );
            affected.requires_full_query = true;
            continue;
        }

        // Editing a source file does not change the build graph; adding or removing one may
        // change glob results in its package.
        if change.operation == FileOperation::Modify {
            continue;
        }
        match summary.package_for_path(path) {
            Some(package) => {
                if !affected.deleted.contains(package) {
                    affected.modified.insert(package.to_path_buf());
                }
            }
            None => {
                affected.unowned_files.insert(path.to_path_buf());
            }
        }
    }

    for parent in parents {
        if !affected.deleted.contains(&parent) {
            affected.modified.insert(parent);
        }
    }
    affected
}

/// What kind of query a sync needs to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshPlan {
    /// Nothing changed; the previous query data is still valid.
    Noop,
    /// Re-query the whole project.
    Full { reason: String },
    /// Re-query only the affected packages and merge into the previous data.
    Partial(AffectedPackages),
}

/// Plan a refresh of `previous` to the current definition and VCS state.
pub fn plan_refresh(
    previous: &PostQuerySyncData,
    definition: &ProjectDefinition,
    vcs_state: Option<&VcsState>,
) -> RefreshPlan {
    if &previous.project_definition != definition {
        return RefreshPlan::Full {
            reason: "project definition changed".to_string(),
        };
    }
    let (Some(previous_vcs), Some(current_vcs)) = (previous.vcs_state.as_ref(), vcs_state) else {
        return RefreshPlan::Full {
            reason: "no version control state available".to_string(),
        };
    };
    if previous_vcs.upstream_revision != current_vcs.upstream_revision {
        return RefreshPlan::Full {
            reason: format!(
                "upstream revision changed from {} to {}",
                previous_vcs.upstream_revision, current_vcs.upstream_revision
            ),
        };
    }

    // Every pending change is re-evaluated: a BUILD file already modified at the last sync may
    // have been edited again. A file reverted since the last sync disappears from the working
    // set and is re-evaluated with the inverse operation.
    let mut changes = current_vcs.working_set.clone();
    let current_paths = current_vcs
        .working_set
        .iter()
        .map(|change| change.path.clone())
        .collect::<BTreeSet<_>>();
    for reverted in previous_vcs
        .working_set
        .iter()
        .filter(|change| !current_paths.contains(&change.path))
    {
        let operation = match reverted.operation {
            FileOperation::Add => FileOperation::Delete,
            FileOperation::Delete => FileOperation::Add,
            FileOperation::Modify => FileOperation::Modify,
        };
        changes.insert(WorkspaceFileChange::new(operation, reverted.path.clone()));
    }

    let affected = affected_packages(&changes, &previous.query_summary, definition);
    if affected.requires_full_query {
        return RefreshPlan::Full {
            reason: "build definitions outside BUILD files changed".to_string(),
        };
    }
    if affected.is_empty() {
        RefreshPlan::Noop
    } else {
        RefreshPlan::Partial(affected)
    }
}
