use super::{FakeOutputs, FakeRunner, Script};
use qsync_build::{
    ArtifactKind, BazelDependencyBuilder, BuildError, BuildInvoker, DependencyBuilder,
    InvocationContext, InvokerSettings, DEPENDENCIES_OUTPUT_GROUP, RENDER_JARS_OUTPUT_GROUP,
};
use qsync_core::{Label, LanguageClass, ProjectDefinition, GENERATED_ASPECT_FILE};
use qsync_process::{CancellationToken, OutputStream, RecordingConsumer};
use std::{collections::BTreeSet, path::PathBuf, sync::Arc};
use tempfile::tempdir;

fn label(text: &str) -> Label {
    Label::parse(text).unwrap()
}

fn definition() -> ProjectDefinition {
    ProjectDefinition::new(
        [PathBuf::from("java/app")],
        [PathBuf::from("java/app/gen")],
        [LanguageClass::Java],
    )
}

fn builder(workspace: &std::path::Path, runner: Arc<FakeRunner>) -> BazelDependencyBuilder {
    let settings = InvokerSettings {
        build_flags: vec!["--config=ide".to_string()],
        ..InvokerSettings::default()
    };
    BazelDependencyBuilder::new(BuildInvoker::new(workspace, settings, runner))
}

#[test]
fn build_writes_aspect_and_passes_flags_in_order() {
    let workspace = tempdir().unwrap();
    let out = tempdir().unwrap();
    let mut outputs = FakeOutputs::new(out.path());
    outputs
        .file("third_party/libguava.jar", "guava")
        .manifest("@maven//:guava", "guava", &["third_party/libguava.jar"]);

    let runner = Arc::new(FakeRunner::with_script(Script {
        stderr: vec!["INFO: Build completed successfully".to_string()],
        bep: Some(outputs.bep(DEPENDENCIES_OUTPUT_GROUP, 0)),
        ..Script::default()
    }));
    let console = Arc::new(RecordingConsumer::default());
    let ctx = InvocationContext::new(CancellationToken::new()).with_console(console.clone());

    let info = builder(workspace.path(), runner.clone())
        .build(
            &ctx,
            &definition(),
            &BTreeSet::from([label("//java/app:b"), label("//java/app:a")]),
        )
        .unwrap();

    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    let args = &calls[0];
    assert_eq!(args[..3], ["build", "//java/app:a", "//java/app:b"]);
    assert!(args[3].starts_with("--build_event_json_file="));
    assert_eq!(
        args[4..],
        [
            "--aspects=//:.aswb.bzl%collect_dependencies,//:.aswb.bzl%package_dependencies",
            "--output_groups=ij_query_sync",
            "--noexperimental_run_validations",
            "--config=ide",
        ]
    );

    let aspect = std::fs::read_to_string(workspace.path().join(GENERATED_ASPECT_FILE)).unwrap();
    assert!(aspect.contains("\"//java/app\","));
    assert!(aspect.contains("\"//java/app/gen\","));

    let guava = info.artifacts_for(&label("@maven//:guava"));
    assert_eq!(guava.len(), 1);
    assert_eq!(guava[0].kind, ArtifactKind::Jar);
    assert_eq!(
        guava[0].artifact.relative_path,
        PathBuf::from("bazel-out/k8-fastbuild/bin/third_party/libguava.jar")
    );
    assert!(info.unattributed.is_empty());
    assert_eq!(info.exit_code, 0);

    assert_eq!(
        console.lines(),
        vec![(
            OutputStream::Stderr,
            "INFO: Build completed successfully".to_string()
        )]
    );
}

#[test]
fn failed_build_carries_partial_output() {
    let workspace = tempdir().unwrap();
    let out = tempdir().unwrap();
    let mut outputs = FakeOutputs::new(out.path());
    outputs
        .file("dep/libdep.jar", "dep")
        .manifest("//dep:dep", "dep", &["dep/libdep.jar"])
        .file("stray.txt", "stray")
        .failed_target("//java/app:broken");

    let runner = Arc::new(FakeRunner::with_script(Script {
        exit_code: 1,
        bep: Some(outputs.bep(DEPENDENCIES_OUTPUT_GROUP, 1)),
        ..Script::default()
    }));

    let err = builder(workspace.path(), runner)
        .build(
            &InvocationContext::default(),
            &definition(),
            &BTreeSet::from([label("//java/app:app")]),
        )
        .unwrap_err();

    let (exit_code, partial) = match err {
        BuildError::BuildFailed { exit_code, partial } => (exit_code, partial),
        other => panic!("unexpected error: {other}"),
    };
    assert_eq!(exit_code, 1);
    assert_eq!(partial.artifacts_for(&label("//dep:dep")).len(), 1);
    assert_eq!(partial.unattributed.len(), 1);
    assert!(partial
        .targets_with_errors
        .contains(&label("//java/app:broken")));
}

#[test]
fn malformed_build_event_file_is_a_bep_error() {
    let workspace = tempdir().unwrap();
    let runner = Arc::new(FakeRunner::with_script(Script {
        exit_code: 2,
        bep: Some("not json".to_string()),
        ..Script::default()
    }));

    let err = builder(workspace.path(), runner)
        .build(
            &InvocationContext::default(),
            &definition(),
            &BTreeSet::from([label("//java/app:app")]),
        )
        .unwrap_err();
    assert!(matches!(err, BuildError::Bep(_)), "{err}");
}

#[test]
fn cancelled_build_is_reported_as_cancelled() {
    let workspace = tempdir().unwrap();
    let runner = Arc::new(FakeRunner::with_script(Script {
        exit_code: 8,
        cancelled: true,
        ..Script::default()
    }));

    let err = builder(workspace.path(), runner)
        .build(
            &InvocationContext::default(),
            &definition(),
            &BTreeSet::from([label("//java/app:app")]),
        )
        .unwrap_err();
    assert!(err.is_cancelled(), "{err}");
}

#[test]
fn aspect_write_failure_aborts_before_building() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("does-not-exist");
    let runner = Arc::new(FakeRunner::default());

    let err = builder(&missing, runner.clone())
        .build(
            &InvocationContext::default(),
            &definition(),
            &BTreeSet::from([label("//java/app:app")]),
        )
        .unwrap_err();
    assert!(matches!(err, BuildError::AspectWrite { .. }), "{err}");
    assert!(runner.calls().is_empty());
}

#[test]
fn empty_target_set_does_not_invoke_the_build() {
    let workspace = tempdir().unwrap();
    let runner = Arc::new(FakeRunner::default());
    let info = builder(workspace.path(), runner.clone())
        .build(&InvocationContext::default(), &definition(), &BTreeSet::new())
        .unwrap();
    assert!(info.is_empty());
    assert!(runner.calls().is_empty());
}

#[test]
fn render_jar_build_uses_render_aspect() {
    let workspace = tempdir().unwrap();
    let out = tempdir().unwrap();
    let mut outputs = FakeOutputs::new(out.path());
    outputs.file("java/app/libapp.jar", "app");
    let runner = Arc::new(FakeRunner::with_script(Script {
        bep: Some(outputs.bep(RENDER_JARS_OUTPUT_GROUP, 0)),
        ..Script::default()
    }));

    let jars = builder(workspace.path(), runner.clone())
        .build_render_jar(
            &InvocationContext::default(),
            &definition(),
            &BTreeSet::from([label("//java/app:app")]),
        )
        .unwrap();

    assert_eq!(jars.len(), 1);
    assert_eq!(jars[0].output_group, RENDER_JARS_OUTPUT_GROUP);
    let args = &runner.calls()[0];
    assert!(args.contains(&"--aspects=//:.aswb.bzl%collect_render_jars".to_string()));
    assert!(args.contains(&"--output_groups=ij_query_sync_render_jars".to_string()));
}
