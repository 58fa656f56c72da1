
use qsync_build::{
    ArtifactKind, BuildError, DependencyBuilder, InvocationContext, OutputInfo, QueryRunner,
    TargetArtifact,
};
use qsync_cache::CopyPool;
use qsync_core::{
    FileOperation, Label, LanguageClass, LanguageRegistry, OutputArtifact, ProjectDefinition,
    QuerySummary, VcsState, WorkspaceFileChange,
};
use qsync_project::{
    FileRefresher, OutputSink, PrintOutput, ProjectComponents, ProjectDefinitionProvider,
    ProjectLoader, SyncContext, SyncError, SyncMode, SyncResult, SyncStatus, TaskOrigin,
    VcsStateProvider,
};
use serde_json::json;
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};
use tempfile::TempDir;

pub fn label(text: &str) -> Label {
    Label::parse(text).unwrap()
}

pub fn labels(texts: &[&str]) -> BTreeSet<Label> {
    texts.iter().map(|text| label(text)).collect()
}

fn rule_line(name: &str, srcs: &[&str], deps: &[&str]) -> String {
    json!({
        "type": "RULE",
        "rule": {
            "name": name,
            "ruleClass": "java_library",
            "attribute": [
                {"name": "srcs", "type": "LABEL_LIST", "stringListValue": srcs},
                {"name": "deps", "type": "LABEL_LIST", "stringListValue": deps},
            ],
        },
    })
    .to_string()
}

fn source_line(name: &str) -> String {
    json!({"type": "SOURCE_FILE", "sourceFile": {"name": name}}).to_string()
}

/// `java/app` is the project; `java/lib` and `@maven` are outside it.
///
/// - `//java/app:app` owns `A.java` and depends on `//java/lib:lib` and `@maven//:guava`.
/// - `//java/app:other` owns `Other.java` and has no dependencies.
pub fn project_summary() -> QuerySummary {
    let lines = [
        source_line("//java/app:BUILD"),
        source_line("//java/app:A.java"),
        source_line("//java/app:Other.java"),
        rule_line(
            "//java/app:app",
            &["//java/app:A.java"],
            &["//java/lib:lib", "@maven//:guava"],
        ),
        rule_line("//java/app:other", &["//java/app:Other.java"], &[]),
        source_line("//java/lib:BUILD"),
        rule_line("//java/lib:lib", &["//java/lib:Lib.java"], &["@maven//:gson"]),
    ];
    QuerySummary::parse(lines.join("\n").as_bytes()).unwrap()
}

pub fn app_definition() -> ProjectDefinition {
    ProjectDefinition::new([PathBuf::from("java/app")], [], [LanguageClass::Java])
}

pub fn vcs(revision: &str, changes: &[(FileOperation, &str)]) -> VcsState {
    VcsState {
        upstream_revision: revision.to_string(),
        working_set: changes
            .iter()
            .map(|(op, path)| WorkspaceFileChange::new(*op, *path))
            .collect(),
    }
}

#[derive(Default)]
pub struct FakeQuery {
    pub calls: Mutex<Vec<String>>,
    pub summary: Mutex<QuerySummary>,
    pub fail: Mutex<bool>,
}

impl FakeQuery {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl QueryRunner for FakeQuery {
    fn query(&self, _ctx: &InvocationContext, expression: &str) -> Result<QuerySummary, BuildError> {
        self.calls.lock().unwrap().push(expression.to_string());
        if *self.fail.lock().unwrap() {
            return Err(BuildError::QueryFailed {
                exit_code: 7,
                stderr: "ERROR: no such package".to_string(),
            });
        }
        Ok(self.summary.lock().unwrap().clone())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BuildBehaviour {
    #[default]
    Succeed,
    Fail(i32),
    BlockUntilCancelled,
    Panic,
}

/// Returns a fixed [`OutputInfo`] for every build and records the requested targets.
#[derive(Default)]
pub struct FakeBuilder {
    pub calls: Mutex<Vec<BTreeSet<Label>>>,
    pub render_calls: Mutex<Vec<BTreeSet<Label>>>,
    pub output: Mutex<OutputInfo>,
    pub render_jars: Mutex<Vec<OutputArtifact>>,
    pub behaviour: Mutex<BuildBehaviour>,
}

impl FakeBuilder {
    pub fn calls(&self) -> Vec<BTreeSet<Label>> {
        self.calls.lock().unwrap().clone()
    }
}

impl DependencyBuilder for FakeBuilder {
    fn build(
        &self,
        ctx: &InvocationContext,
        _definition: &ProjectDefinition,
        targets: &BTreeSet<Label>,
    ) -> Result<OutputInfo, BuildError> {
        self.calls.lock().unwrap().push(targets.clone());
        let behaviour = *self.behaviour.lock().unwrap();
        let output = self.output.lock().unwrap().clone();
        match behaviour {
            BuildBehaviour::Succeed => Ok(output),
            BuildBehaviour::Fail(exit_code) => Err(BuildError::BuildFailed {
                exit_code,
                partial: Box::new(output),
            }),
            BuildBehaviour::BlockUntilCancelled => {
                while !ctx.is_cancelled() {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(BuildError::Cancelled)
            }
            BuildBehaviour::Panic => panic!("builder exploded"),
        }
    }

    fn build_render_jar(
        &self,
        _ctx: &InvocationContext,
        _definition: &ProjectDefinition,
        targets: &BTreeSet<Label>,
    ) -> Result<Vec<OutputArtifact>, BuildError> {
        self.render_calls.lock().unwrap().push(targets.clone());
        Ok(self.render_jars.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct FakeVcs {
    pub state: Mutex<Option<VcsState>>,
}

impl VcsStateProvider for FakeVcs {
    fn vcs_state(&self, _ctx: &SyncContext) -> Result<Option<VcsState>, SyncError> {
        Ok(self.state.lock().unwrap().clone())
    }
}

pub struct FakeDefinition {
    pub definition: Mutex<ProjectDefinition>,
}

impl ProjectDefinitionProvider for FakeDefinition {
    fn project_definition(&self) -> Result<ProjectDefinition, SyncError> {
        Ok(self.definition.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct RecordingRefresher {
    pub calls: Mutex<Vec<BTreeSet<PathBuf>>>,
}

impl FileRefresher for RecordingRefresher {
    fn refresh_files(&self, paths: BTreeSet<PathBuf>) {
        self.calls.lock().unwrap().push(paths);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    Started(SyncMode, TaskOrigin),
    Ended(SyncMode, SyncResult),
}

#[derive(Default)]
pub struct RecordingStatus {
    pub events: Mutex<Vec<StatusEvent>>,
}

impl RecordingStatus {
    pub fn events(&self) -> Vec<StatusEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl SyncStatus for RecordingStatus {
    fn sync_started(&self, mode: SyncMode, origin: TaskOrigin) {
        self.events
            .lock()
            .unwrap()
            .push(StatusEvent::Started(mode, origin));
    }

    fn sync_ended(&self, mode: SyncMode, result: SyncResult) {
        self.events
            .lock()
            .unwrap()
            .push(StatusEvent::Ended(mode, result));
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub outputs: Mutex<Vec<PrintOutput>>,
}

impl OutputSink for RecordingSink {
    fn output(&self, output: &PrintOutput) {
        self.outputs.lock().unwrap().push(output.clone());
    }
}

/// A temporary workspace with fakes for every external collaborator.
pub struct Workspace {
    pub dir: TempDir,
    pub query: Arc<FakeQuery>,
    pub builder: Arc<FakeBuilder>,
    pub vcs: Arc<FakeVcs>,
    pub definition: Arc<FakeDefinition>,
    pub refresher: Arc<RecordingRefresher>,
}

impl Workspace {
    pub fn new() -> Self {
        let query = FakeQuery::default();
        *query.summary.lock().unwrap() = project_summary();
        Self {
            dir: tempfile::tempdir().unwrap(),
            query: Arc::new(query),
            builder: Arc::new(FakeBuilder::default()),
            vcs: Arc::new(FakeVcs::default()),
            definition: Arc::new(FakeDefinition {
                definition: Mutex::new(app_definition()),
            }),
            refresher: Arc::new(RecordingRefresher::default()),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root().join(".qsync/cache")
    }

    pub fn loader(&self) -> ProjectLoader {
        ProjectLoader::new(ProjectComponents {
            workspace_root: self.root().to_path_buf(),
            data_dir: self.root().join(".qsync"),
            cache_dir: self.cache_dir(),
            definition: self.definition.clone(),
            query: self.query.clone(),
            builder: self.builder.clone(),
            vcs: self.vcs.clone(),
            refresher: self.refresher.clone(),
            copy_pool: CopyPool::inline(),
            registry: LanguageRegistry::with_defaults(),
        })
    }

    /// Write `bazel-out/bin/<rel>` and describe it as a build output.
    pub fn artifact(&self, rel: &str, contents: &str) -> OutputArtifact {
        let relative = PathBuf::from("bazel-out/bin").join(rel);
        let local = self.root().join(&relative);
        std::fs::create_dir_all(local.parent().unwrap()).unwrap();
        std::fs::write(&local, contents).unwrap();
        OutputArtifact::new(relative, local, contents, "ij_query_sync")
    }

    /// Make the fake build produce a jar for each of `targets`.
    pub fn set_build_output(&self, targets: &[(&str, &str)]) {
        let mut info = OutputInfo::default();
        for (target, jar) in targets {
            let artifact = self.artifact(jar, target);
            info.artifacts
                .entry(label(target))
                .or_default()
                .push(TargetArtifact {
                    kind: ArtifactKind::Jar,
                    artifact,
                });
        }
        *self.builder.output.lock().unwrap() = info;
    }
}
