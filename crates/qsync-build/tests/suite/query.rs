use super::{FakeRunner, Script};
use qsync_build::{
    BazelQueryRunner, BuildError, BuildInvoker, InvocationContext, InvokerSettings, QueryRunner,
};
use qsync_core::Label;
use serde_json::json;
use std::sync::Arc;
use tempfile::tempdir;

fn rule(label: &str, deps: &[&str]) -> String {
    json!({
        "type": "RULE",
        "rule": {
            "name": label,
            "ruleClass": "java_library",
            "attribute": [{"name": "deps", "type": "LABEL_LIST", "stringListValue": deps}],
        },
    })
    .to_string()
}

fn runner_for(script: Script) -> (Arc<FakeRunner>, BazelQueryRunner, tempfile::TempDir) {
    let workspace = tempdir().unwrap();
    let runner = Arc::new(FakeRunner::with_script(script));
    let settings = InvokerSettings {
        query_flags: vec!["--noimplicit_deps".to_string()],
        ..InvokerSettings::default()
    };
    let query = BazelQueryRunner::new(BuildInvoker::new(
        workspace.path(),
        settings,
        runner.clone(),
    ));
    (runner, query, workspace)
}

#[test]
fn parses_streamed_output_and_passes_flags() {
    let (runner, query, _workspace) = runner_for(Script {
        stdout: vec![
            rule("//java/a:a", &["//java/b:b"]),
            rule("//java/b:b", &[]),
        ],
        ..Script::default()
    });

    let summary = query
        .query(&InvocationContext::default(), "(//java/...)")
        .unwrap();

    assert_eq!(summary.rules().len(), 2);
    let a = summary.rule(&Label::parse("//java/a:a").unwrap()).unwrap();
    assert_eq!(a.attribute("deps"), &[Label::parse("//java/b:b").unwrap()]);
    assert_eq!(
        runner.calls(),
        vec![vec![
            "query".to_string(),
            "--output=streamed_jsonproto".to_string(),
            "--relative_locations=true".to_string(),
            "--keep_going".to_string(),
            "--noimplicit_deps".to_string(),
            "(//java/...)".to_string(),
        ]]
    );
}

#[test]
fn partial_results_are_accepted() {
    let (_runner, query, _workspace) = runner_for(Script {
        exit_code: 3,
        stdout: vec![rule("//java/a:a", &[])],
        ..Script::default()
    });
    let summary = query.query(&InvocationContext::default(), "//java/...").unwrap();
    assert_eq!(summary.rules().len(), 1);
}

#[test]
fn other_exit_codes_fail_with_stderr() {
    let (_runner, query, _workspace) = runner_for(Script {
        exit_code: 7,
        stderr: vec!["ERROR: no such package".to_string()],
        ..Script::default()
    });
    let err = query
        .query(&InvocationContext::default(), "//missing/...")
        .unwrap_err();
    match err {
        BuildError::QueryFailed { exit_code, stderr } => {
            assert_eq!(exit_code, 7);
            assert!(stderr.contains("no such package"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn malformed_output_is_a_parse_error() {
    let (_runner, query, _workspace) = runner_for(Script {
        stdout: vec![rule("//java/a:a", &[]), "{".to_string()],
        ..Script::default()
    });
    let err = query.query(&InvocationContext::default(), "//java/...").unwrap_err();
    assert!(matches!(err, BuildError::QueryParse(_)), "{err}");
}
