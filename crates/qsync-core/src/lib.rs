//! Core data model for query-based project sync.
//!
//! - [`Label`]s and the [`ProjectDefinition`] describing the project boundary
//! - the raw [`QuerySummary`] produced by `bazel query` and the durable [`PostQuerySyncData`]
//! - the resolved [`BuildGraph`] and immutable [`BlazeProjectSnapshot`]
//! - delta planning for partial re-queries ([`plan_refresh`])
//! - the explicit [`LanguageRegistry`] of per-language dependency rules

mod artifact;
mod delta;
mod graph;
mod label;
mod languages;
mod project_definition;
mod query_summary;
mod snapshot;
mod targets_to_build;

pub use crate::{
    artifact::{timestamp_digest, OutputArtifact},
    delta::{affected_packages, plan_refresh, AffectedPackages, RefreshPlan, GENERATED_ASPECT_FILE},
    graph::BuildGraph,
    label::{Label, LabelError},
    languages::{LanguageRegistry, LanguageSupport, RuleFamily},
    project_definition::{
        normalize_workspace_path, workspace_path_string, LanguageClass, ProjectDefinition,
    },
    query_summary::{
        is_build_file_name, QueryParseError, QueryRule, QuerySummary, QuerySummaryBuilder,
        QuerySummaryDelta,
    },
    snapshot::{
        BlazeProjectSnapshot, FileOperation, PostQuerySyncData, SnapshotBuilder, VcsState,
        WorkspaceFileChange,
    },
    targets_to_build::TargetsToBuild,
};
