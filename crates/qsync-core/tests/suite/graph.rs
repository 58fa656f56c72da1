use super::{rule_line, source_line, summary};
use qsync_core::{
    BuildGraph, LanguageClass, LanguageRegistry, Label, PostQuerySyncData, ProjectDefinition,
    SnapshotBuilder, TargetsToBuild,
};
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

fn label(text: &str) -> Label {
    Label::parse(text).unwrap()
}

fn labels(texts: &[&str]) -> BTreeSet<Label> {
    texts.iter().map(|t| label(t)).collect()
}

fn java_project(include: &[&str], exclude: &[&str]) -> ProjectDefinition {
    ProjectDefinition::new(
        include.iter().map(|p| PathBuf::from(*p)),
        exclude.iter().map(|p| PathBuf::from(*p)),
        [LanguageClass::Java],
    )
}

fn fixture() -> qsync_core::QuerySummary {
    summary(&[
        source_line("//java/app:BUILD"),
        rule_line(
            "//java/app:app",
            "java_binary",
            &["//java/app:Main.java"],
            &["//java/lib:lib", "@maven//:guava"],
        ),
        source_line("//java/lib:BUILD"),
        rule_line(
            "//java/lib:lib",
            "java_library",
            &["//java/lib:Lib.java", "//java/lib:gen_src"],
            &["//java/gen:proto", "//third_party:annotations"],
        ),
        rule_line("//java/lib:gen_src", "genrule", &[], &[]),
        source_line("//java/gen:BUILD"),
        rule_line("//java/gen:proto", "java_library", &["//java/gen:P.java"], &[]),
        source_line("//java/leaf:BUILD"),
        rule_line("//java/leaf:leaf", "java_library", &["//java/leaf:Leaf.java"], &[]),
        source_line("//third_party:BUILD"),
        rule_line("//third_party:annotations", "java_import", &[], &[]),
    ])
}

#[test]
fn file_dependencies_are_external_transitive_closure() {
    let graph = BuildGraph::build(
        &fixture(),
        &java_project(&["java"], &["java/gen"]),
        &LanguageRegistry::with_defaults(),
    );

    assert_eq!(
        graph.get_target_owner(Path::new("java/app/Main.java")),
        Some(&label("//java/app:app"))
    );
    // `//java/gen:proto` is excluded from the project, so it is an external dependency and
    // the walk does not descend into it.
    assert_eq!(
        graph.get_file_dependencies(Path::new("java/app/Main.java")),
        Some(labels(&[
            "@maven//:guava",
            "//java/gen:proto",
            "//third_party:annotations"
        ]))
    );
    assert_eq!(
        graph.get_file_dependencies(Path::new("java/leaf/Leaf.java")),
        Some(BTreeSet::new())
    );
    assert_eq!(graph.get_file_dependencies(Path::new("java/gen/P.java")), None);
    // Generated sources are not workspace files.
    assert_eq!(graph.get_target_owner(Path::new("java/lib/gen_src")), None);
}

#[test]
fn shared_sources_are_owned_by_the_smallest_label() {
    let summary = summary(&[
        rule_line("//p:z", "java_library", &["//p:Shared.java"], &[]),
        rule_line("//p:a", "java_library", &["//p:Shared.java"], &[]),
    ]);
    let graph = BuildGraph::build(
        &summary,
        &java_project(&["p"], &[]),
        &LanguageRegistry::with_defaults(),
    );
    assert_eq!(
        graph.get_target_owner(Path::new("p/Shared.java")),
        Some(&label("//p:a"))
    );
}

#[test]
fn disabled_languages_are_not_project_targets() {
    let summary = summary(&[
        rule_line("//cc:lib", "cc_library", &["//cc:lib.cc"], &["//cc:dep"]),
        rule_line("//cc:dep", "cc_library", &["//cc:dep.cc"], &[]),
    ]);
    let graph = BuildGraph::build(
        &summary,
        &java_project(&["cc"], &[]),
        &LanguageRegistry::with_defaults(),
    );
    assert!(!graph.is_project_target(&label("//cc:lib")));
    assert_eq!(graph.get_target_owner(Path::new("cc/lib.cc")), None);
}

#[test]
fn reverse_dependencies_are_transitive() {
    let graph = BuildGraph::build(
        &fixture(),
        &java_project(&["java"], &[]),
        &LanguageRegistry::with_defaults(),
    );
    assert_eq!(
        graph.get_targets_depending_on(&labels(&["//java/gen:proto"])),
        labels(&["//java/lib:lib", "//java/app:app"])
    );
}

#[test]
fn snapshot_reports_targets_to_build_for_sources_and_build_files() {
    let snapshot = SnapshotBuilder::default().create(PostQuerySyncData::new(
        java_project(&["java"], &[]),
        None,
        fixture(),
    ));

    assert_eq!(
        snapshot.targets_to_build(Path::new("java/lib/Lib.java")),
        TargetsToBuild::SourceFile(labels(&["//java/lib:lib"]))
    );
    assert_eq!(
        snapshot.targets_to_build(Path::new("java/lib/BUILD")),
        TargetsToBuild::BuildFile(labels(&["//java/lib:lib"]))
    );
    assert_eq!(
        snapshot.targets_to_build(Path::new("docs/README.md")),
        TargetsToBuild::None
    );
}
