use crate::{
    bep::ParsedBepOutput,
    command::{CommandOutput, CommandRunner},
    context::InvocationContext,
    error::BuildError,
};
use parking_lot::Mutex;
use qsync_core::{Label, QueryParseError, QuerySummary, QuerySummaryBuilder};
use qsync_process::{LineConsumer, OutputStream, RunOptions};
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

/// Query exit code for a result that is partial because of errors (`--keep_going`).
const QUERY_PARTIAL_SUCCESS: i32 = 3;

/// Settings shared by every invocation of the build tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokerSettings {
    pub binary: String,
    /// Appended to every `build` invocation.
    pub build_flags: Vec<String>,
    /// Appended to every `query` invocation.
    pub query_flags: Vec<String>,
    pub timeout: Option<Duration>,
}

impl Default for InvokerSettings {
    fn default() -> Self {
        Self {
            binary: "bazel".to_string(),
            build_flags: Vec::new(),
            query_flags: Vec::new(),
            timeout: None,
        }
    }
}

/// The result of a `build` that ran to completion, successfully or not.
#[derive(Debug)]
pub struct BuildOutcome {
    pub exit_code: i32,
    pub bep: ParsedBepOutput,
}

/// Runs the build tool in a workspace.
#[derive(Clone)]
pub struct BuildInvoker {
    workspace_root: PathBuf,
    settings: InvokerSettings,
    runner: Arc<dyn CommandRunner>,
}

impl BuildInvoker {
    pub fn new(
        workspace_root: impl Into<PathBuf>,
        settings: InvokerSettings,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            settings,
            runner,
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn settings(&self) -> &InvokerSettings {
        &self.settings
    }

    /// `build <targets> --build_event_json_file=<tmp> <flags> <user build flags>`.
    ///
    /// Returns once the build has finished and its event file was parsed. A non-zero exit is
    /// not an error at this level; the caller decides.
    pub fn build(
        &self,
        ctx: &InvocationContext,
        targets: &BTreeSet<Label>,
        flags: &[String],
    ) -> Result<BuildOutcome, BuildError> {
        if ctx.is_cancelled() {
            return Err(BuildError::Cancelled);
        }

        let bep_file = tempfile::Builder::new()
            .prefix("qsync-bep-")
            .suffix(".json")
            .tempfile()
            .map_err(|source| BuildError::Io {
                command: "create build event file".to_string(),
                source,
            })?
            .into_temp_path();

        let mut args = vec!["build".to_string()];
        args.extend(targets.iter().map(Label::to_string));
        args.push(format!("--build_event_json_file={}", bep_file.display()));
        args.extend(flags.iter().cloned());
        args.extend(self.settings.build_flags.iter().cloned());

        tracing::info!(
            target = "qsync.build",
            targets = targets.len(),
            workspace = %self.workspace_root.display(),
            "starting build"
        );
        let output = self.run(ctx, &args, ctx.console.clone())?;
        let exit_code = output.exit_code.unwrap_or(-1);

        let bep = ParsedBepOutput::parse_file(&bep_file)?;
        tracing::info!(
            target = "qsync.build",
            exit_code,
            build_id = bep.build_id().unwrap_or_default(),
            failed_targets = bep.targets_with_errors().len(),
            "build finished"
        );
        Ok(BuildOutcome { exit_code, bep })
    }

    /// `query --output=streamed_jsonproto --relative_locations=true --keep_going <expr>`.
    ///
    /// Exit codes 0 and 3 (partial result) are accepted.
    pub fn query(
        &self,
        ctx: &InvocationContext,
        expression: &str,
    ) -> Result<QuerySummary, BuildError> {
        if ctx.is_cancelled() {
            return Err(BuildError::Cancelled);
        }

        let mut args = vec![
            "query".to_string(),
            "--output=streamed_jsonproto".to_string(),
            "--relative_locations=true".to_string(),
            "--keep_going".to_string(),
        ];
        args.extend(self.settings.query_flags.iter().cloned());
        args.push(expression.to_string());

        let sink = Arc::new(QueryOutputSink {
            builder: Mutex::new(Ok(QuerySummaryBuilder::default())),
            console: ctx.console.clone(),
        });
        tracing::info!(target = "qsync.query", expression, "running query");
        let lines: Arc<dyn LineConsumer> = sink.clone();
        let output = self.run(ctx, &args, Some(lines))?;

        let exit_code = output.exit_code.unwrap_or(-1);
        if exit_code != 0 && exit_code != QUERY_PARTIAL_SUCCESS {
            return Err(BuildError::QueryFailed {
                exit_code,
                stderr: output.stderr,
            });
        }
        if exit_code == QUERY_PARTIAL_SUCCESS {
            tracing::warn!(
                target = "qsync.query",
                "query completed with errors; result is partial"
            );
        }

        let builder = std::mem::replace(
            &mut *sink.builder.lock(),
            Ok(QuerySummaryBuilder::default()),
        );
        let summary = builder?.build();
        tracing::info!(
            target = "qsync.query",
            rules = summary.rules().len(),
            packages = summary.packages().len(),
            "query finished"
        );
        Ok(summary)
    }

    fn run(
        &self,
        ctx: &InvocationContext,
        args: &[String],
        lines: Option<Arc<dyn LineConsumer>>,
    ) -> Result<CommandOutput, BuildError> {
        let opts = RunOptions {
            timeout: self.settings.timeout,
            cancellation: Some(ctx.cancellation.clone()),
            lines,
            ..RunOptions::default()
        };
        let command = format!("{} {}", self.settings.binary, args.join(" "));
        let output = self
            .runner
            .run(&self.workspace_root, &self.settings.binary, args, opts)
            .map_err(|source| BuildError::Io {
                command: command.clone(),
                source,
            })?;

        if output.cancelled || ctx.is_cancelled() {
            return Err(BuildError::Cancelled);
        }
        if output.timed_out {
            return Err(BuildError::TimedOut {
                command,
                timeout: self.settings.timeout.unwrap_or_default(),
            });
        }
        Ok(output)
    }
}

/// Parses query stdout as it streams; stderr goes to the console.
struct QueryOutputSink {
    builder: Mutex<Result<QuerySummaryBuilder, QueryParseError>>,
    console: Option<Arc<dyn LineConsumer>>,
}

impl LineConsumer for QueryOutputSink {
    fn accept(&self, stream: OutputStream, line: &str) {
        match stream {
            OutputStream::Stdout => {
                let mut state = self.builder.lock();
                if let Ok(builder) = state.as_mut() {
                    if let Err(err) = builder.accept_line(line) {
                        *state = Err(err);
                    }
                }
            }
            OutputStream::Stderr => {
                if let Some(console) = &self.console {
                    console.accept(stream, line);
                }
            }
        }
    }
}
