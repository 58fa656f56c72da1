use super::{rule_line, source_line, summary};
use qsync_core::{
    affected_packages, plan_refresh, FileOperation, LanguageClass, PostQuerySyncData,
    ProjectDefinition, RefreshPlan, VcsState, WorkspaceFileChange, GENERATED_ASPECT_FILE,
};
use std::{collections::BTreeSet, path::PathBuf};

fn definition() -> ProjectDefinition {
    ProjectDefinition::new(
        [PathBuf::from("java")],
        [PathBuf::from("java/gen")],
        [LanguageClass::Java],
    )
}

fn vcs(revision: &str, changes: &[(FileOperation, &str)]) -> VcsState {
    VcsState {
        upstream_revision: revision.to_string(),
        working_set: changes
            .iter()
            .map(|(op, path)| WorkspaceFileChange::new(*op, *path))
            .collect(),
    }
}

fn previous(vcs_state: Option<VcsState>) -> PostQuerySyncData {
    PostQuerySyncData::new(
        definition(),
        vcs_state,
        summary(&[
            source_line("//java/a:BUILD"),
            rule_line("//java/a:a", "java_library", &["//java/a:A.java"], &[]),
            source_line("//java/b:BUILD"),
            rule_line("//java/b:b", "java_library", &["//java/b:B.java"], &[]),
        ]),
    )
}

fn packages(paths: &[&str]) -> BTreeSet<PathBuf> {
    paths.iter().map(|p| PathBuf::from(*p)).collect()
}

#[test]
fn changed_definition_forces_full_query() {
    let other = ProjectDefinition::new(
        [PathBuf::from("java")],
        std::iter::empty(),
        [LanguageClass::Java],
    );
    let state = vcs("r1", &[]);
    let plan = plan_refresh(&previous(Some(state.clone())), &other, Some(&state));
    assert!(matches!(plan, RefreshPlan::Full { .. }), "{plan:?}");
}

#[test]
fn missing_or_moved_vcs_state_forces_full_query() {
    let state = vcs("r1", &[]);
    assert!(matches!(
        plan_refresh(&previous(None), &definition(), Some(&state)),
        RefreshPlan::Full { .. }
    ));
    assert!(matches!(
        plan_refresh(&previous(Some(state.clone())), &definition(), None),
        RefreshPlan::Full { .. }
    ));
    assert!(matches!(
        plan_refresh(
            &previous(Some(state)),
            &definition(),
            Some(&vcs("r2", &[]))
        ),
        RefreshPlan::Full { .. }
    ));
}

#[test]
fn unchanged_source_edits_are_a_noop() {
    let state = vcs(
        "r1",
        &[
            (FileOperation::Modify, "java/a/A.java"),
            (FileOperation::Modify, "java/b/B.java"),
        ],
    );
    assert_eq!(
        plan_refresh(&previous(Some(state.clone())), &definition(), Some(&state)),
        RefreshPlan::Noop
    );
}

#[test]
fn build_file_edited_again_is_requeried() {
    // Already modified at the last sync; the working set looks the same but the file may not.
    let state = vcs("r1", &[(FileOperation::Modify, "java/a/BUILD")]);
    let RefreshPlan::Partial(affected) =
        plan_refresh(&previous(Some(state.clone())), &definition(), Some(&state))
    else {
        panic!("expected a partial refresh");
    };
    assert_eq!(affected.modified, packages(&["java/a"]));
    assert_eq!(affected.query_expression().as_deref(), Some("//java/a:*"));
}

#[test]
fn deleting_a_subpackage_requeries_its_parent() {
    let data = PostQuerySyncData::new(
        definition(),
        None,
        summary(&[
            source_line("//java/a:BUILD"),
            rule_line("//java/a:a", "java_library", &["//java/a:A.java"], &[]),
            source_line("//java/a/sub:BUILD"),
            rule_line("//java/a/sub:sub", "java_library", &["//java/a/sub:S.java"], &[]),
        ]),
    );
    let changes = [WorkspaceFileChange::new(
        FileOperation::Delete,
        "java/a/sub/BUILD",
    )];
    let affected = affected_packages(&changes, &data.query_summary, &definition());
    assert_eq!(affected.deleted, packages(&["java/a/sub"]));
    assert_eq!(affected.modified, packages(&["java/a"]));
}

#[test]
fn adding_a_subpackage_requeries_its_parent() {
    let data = previous(None);
    let changes = [WorkspaceFileChange::new(FileOperation::Add, "java/a/sub/BUILD")];
    let affected = affected_packages(&changes, &data.query_summary, &definition());
    assert_eq!(affected.modified, packages(&["java/a", "java/a/sub"]));
    assert!(affected.deleted.is_empty());
}

#[test]
fn source_edits_do_not_require_a_query() {
    let current = vcs("r1", &[(FileOperation::Modify, "java/a/A.java")]);
    assert_eq!(
        plan_refresh(&previous(Some(vcs("r1", &[]))), &definition(), Some(&current)),
        RefreshPlan::Noop
    );
}

#[test]
fn build_file_and_source_additions_requery_their_packages() {
    let current = vcs(
        "r1",
        &[
            (FileOperation::Modify, "java/a/BUILD"),
            (FileOperation::Add, "java/b/sub/New.java"),
        ],
    );
    let RefreshPlan::Partial(affected) =
        plan_refresh(&previous(Some(vcs("r1", &[]))), &definition(), Some(&current))
    else {
        panic!("expected a partial refresh");
    };
    assert_eq!(affected.modified, packages(&["java/a", "java/b"]));
    assert!(affected.deleted.is_empty());
    assert_eq!(
        affected.query_expression().as_deref(),
        Some("//java/a:* + //java/b:*")
    );
}

#[test]
fn reverted_build_file_addition_deletes_the_package() {
    let before = vcs("r1", &[(FileOperation::Add, "java/c/BUILD")]);
    let RefreshPlan::Partial(affected) =
        plan_refresh(&previous(Some(before)), &definition(), Some(&vcs("r1", &[])))
    else {
        panic!("expected a partial refresh");
    };
    assert_eq!(affected.deleted, packages(&["java/c"]));
    assert!(affected.modified.is_empty());
}

#[test]
fn starlark_changes_force_full_query() {
    let current = vcs("r1", &[(FileOperation::Modify, "java/defs.bzl")]);
    assert!(matches!(
        plan_refresh(&previous(Some(vcs("r1", &[]))), &definition(), Some(&current)),
        RefreshPlan::Full { .. }
    ));
}

#[test]
fn aspect_file_and_excluded_paths_are_ignored() {
    let data = previous(None);
    let changes = [
        WorkspaceFileChange::new(FileOperation::Modify, GENERATED_ASPECT_FILE),
        WorkspaceFileChange::new(FileOperation::Modify, "java/gen/BUILD"),
        WorkspaceFileChange::new(FileOperation::Add, "docs/BUILD"),
    ];
    let affected = affected_packages(&changes, &data.query_summary, &definition());
    assert!(affected.is_empty(), "{affected:?}");
}

#[test]
fn added_files_outside_known_packages_are_reported_unowned() {
    let data = previous(None);
    let changes = [WorkspaceFileChange::new(
        FileOperation::Add,
        "java/Orphan.java",
    )];
    let affected = affected_packages(&changes, &data.query_summary, &definition());
    assert!(affected.modified.is_empty());
    assert_eq!(affected.unowned_files, packages(&["java/Orphan.java"]));
}
