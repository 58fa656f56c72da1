use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

fn qsync() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("qsync"));
    cmd.env_remove("QSYNC_CONFIG_PATH").env_remove("RUST_LOG");
    cmd
}

fn workspace(config: &str) -> TempDir {
    let temp = TempDir::new().unwrap();
    temp.child("qsync.toml").write_str(config).unwrap();
    temp
}

const CONFIG: &str = r#"
[project]
directories = ["java/app"]

[build]
binary = "qsync-test-missing-build-tool"

[logging]
level = "warn"
"#;

#[test]
fn help_mentions_core_commands() {
    qsync().arg("--help").assert().success().stdout(
        predicate::str::contains("sync")
            .and(predicate::str::contains("deps"))
            .and(predicate::str::contains("analysis"))
            .and(predicate::str::contains("render-jar"))
            .and(predicate::str::contains("pending"))
            .and(predicate::str::contains("targets"))
            .and(predicate::str::contains("clear-cache")),
    );
}

#[test]
fn pending_requires_a_previous_sync() {
    let temp = workspace(CONFIG);
    qsync()
        .arg("--path")
        .arg(temp.path())
        .args(["pending", "java/app/A.java"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("run `qsync sync` first"));
}

#[test]
fn unknown_config_keys_are_rejected() {
    let temp = workspace("[project]\ndirectories = [\"java\"]\nbogus = 1\n");
    qsync()
        .arg("--path")
        .arg(temp.path())
        .arg("clear-cache")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("bogus"));
}

#[test]
fn clear_cache_reports_json() {
    let temp = workspace(CONFIG);
    let output = qsync()
        .arg("--path")
        .arg(temp.path())
        .args(["--json", "clear-cache"])
        .output()
        .unwrap();

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let v: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(v["ok"], true);
}

#[test]
fn sync_fails_when_the_build_tool_cannot_run() {
    let temp = workspace(CONFIG);
    let output = qsync()
        .arg("--path")
        .arg(temp.path())
        .args(["--json", "sync"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let v: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(v["result"], "failure");
    temp.child(".qsync/qsyncdata.json")
        .assert(predicate::path::missing());
}

#[test]
fn bad_labels_are_rejected_before_loading() {
    let temp = workspace(CONFIG);
    qsync()
        .arg("--path")
        .arg(temp.path())
        .args(["analysis", "not a label"])
        .assert()
        .code(2);
}
