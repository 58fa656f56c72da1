use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use qsync_config::QsyncConfig;
use qsync_core::{Label, TargetsToBuild};
use qsync_project::{
    DefaultSyncStatus, OutputKind, OutputSink, PrintOutput, ProjectLoader, QuerySyncManager,
    QuerySyncProject, SyncContext, SyncResult, SyncTask, TaskOrigin,
};
use serde::Serialize;
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::Arc,
};

#[derive(Parser)]
#[command(name = "qsync", version, about = "Query-based project sync for Bazel workspaces")]
struct Cli {
    /// Workspace root (defaults to current directory)
    #[arg(long, global = true, default_value = ".")]
    path: PathBuf,
    /// Emit JSON suitable for scripts
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load the project and bring it up to date, re-querying only what changed
    Sync(SyncArgs),
    /// Build the external dependencies of the targets owning the given files
    Deps(FilesArgs),
    /// Build the external dependencies of the given targets
    Analysis(AnalysisArgs),
    /// Build render jars for the targets owning the given files
    RenderJar(FilesArgs),
    /// Print the dependencies of a file that are not cached yet
    Pending(FileArgs),
    /// Print the project targets to build for a file
    Targets(FileArgs),
    /// Delete every cached dependency artifact
    ClearCache,
}

#[derive(Args)]
struct SyncArgs {
    /// Re-query the whole project even when the stored state could be reused
    #[arg(long)]
    full: bool,
}

#[derive(Args)]
struct FilesArgs {
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[derive(Args)]
struct FileArgs {
    file: PathBuf,
}

#[derive(Args)]
struct AnalysisArgs {
    #[arg(required = true)]
    targets: Vec<String>,
    /// Enable analysis for the project targets depending on the given targets instead
    #[arg(long)]
    reverse: bool,
}

/// Prints build tool output; everything else reaches the user through logging.
struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn output(&self, output: &PrintOutput) {
        if output.kind == OutputKind::Process {
            eprintln!("{}", output.text);
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    let root = cli
        .path
        .canonicalize()
        .with_context(|| format!("workspace {} not found", cli.path.display()))?;
    let (config, config_path) = qsync_config::load_for_workspace(&root)?;
    qsync_config::init_tracing(&config.logging);
    tracing::debug!(
        target = "qsync.cli",
        root = %root.display(),
        config = ?config_path,
        "starting"
    );

    match cli.command {
        Command::Sync(args) => {
            let manager = manager(&root, &config)?;
            let mut result = manager.reload_project(TaskOrigin::UserAction).wait();
            if args.full && result.is_success() {
                result = manager.full_sync(TaskOrigin::UserAction).wait();
            }
            report(result, cli.json)
        }
        Command::Deps(args) => with_loaded_project(&root, &config, cli.json, |manager| {
            let files = absolute(&root, &args.files);
            Ok(manager.build_dependencies_for_files(files, TaskOrigin::UserAction)?)
        }),
        Command::Analysis(args) => {
            let targets = args
                .targets
                .iter()
                .map(|target| Label::parse(target))
                .collect::<Result<BTreeSet<_>, _>>()?;
            with_loaded_project(&root, &config, cli.json, |manager| {
                let task = if args.reverse {
                    manager.enable_analysis_for_reverse_deps(targets, TaskOrigin::UserAction)?
                } else {
                    manager.enable_analysis(targets, TaskOrigin::UserAction)?
                };
                Ok(task)
            })
        }
        Command::RenderJar(args) => with_loaded_project(&root, &config, cli.json, |manager| {
            let files = absolute(&root, &args.files);
            Ok(manager.generate_render_jar(files, TaskOrigin::UserAction)?)
        }),
        Command::Pending(args) => {
            let project = restore_project(&root, &config)?;
            let file = absolute(&root, std::slice::from_ref(&args.file)).remove(0);
            let pending = project.dependency_tracker().get_pending_targets(&file);
            print_pending(&args.file, pending.as_ref(), cli.json)?;
            Ok(0)
        }
        Command::Targets(args) => {
            let project = restore_project(&root, &config)?;
            let file = absolute(&root, std::slice::from_ref(&args.file)).remove(0);
            print_targets(&args.file, &project.get_project_targets(&file), cli.json)?;
            Ok(0)
        }
        Command::ClearCache => {
            let ctx = SyncContext::default();
            let project = ProjectLoader::from_config(&root, &config).load_project(&ctx)?;
            project.dependency_tracker().reset_cache(&ctx)?;
            if cli.json {
                print_json(&serde_json::json!({ "ok": true }))?;
            } else {
                println!("cache: cleared {}", config.cache_dir(&root).display());
            }
            Ok(0)
        }
    }
}

fn manager(root: &Path, config: &QsyncConfig) -> Result<QuerySyncManager> {
    let loader = ProjectLoader::from_config(root, config);
    let sink: Arc<dyn OutputSink> = Arc::new(ConsoleSink);
    Ok(QuerySyncManager::new(
        loader,
        Arc::new(DefaultSyncStatus::default()),
        Some(sink),
    )?)
}

/// Load the project (a delta sync from the stored state), then run `submit`.
fn with_loaded_project(
    root: &Path,
    config: &QsyncConfig,
    json: bool,
    submit: impl FnOnce(&QuerySyncManager) -> Result<SyncTask>,
) -> Result<i32> {
    let manager = manager(root, config)?;
    let loaded = manager.reload_project(TaskOrigin::UserAction).wait();
    if !loaded.is_success() {
        return report(loaded, json);
    }
    report(submit(&manager)?.wait(), json)
}

/// The project with its stored snapshot, without querying anything.
fn restore_project(root: &Path, config: &QsyncConfig) -> Result<QuerySyncProject> {
    let ctx = SyncContext::default();
    let project = ProjectLoader::from_config(root, config).load_project(&ctx)?;
    if project.read_snapshot_from_disk(&ctx)?.is_none() {
        anyhow::bail!("no sync state found; run `qsync sync` first");
    }
    Ok(project)
}

fn absolute(root: &Path, files: &[PathBuf]) -> Vec<PathBuf> {
    files
        .iter()
        .map(|file| {
            if file.is_absolute() {
                file.clone()
            } else {
                root.join(file)
            }
        })
        .collect()
}

fn report(result: SyncResult, json: bool) -> Result<i32> {
    let (name, code) = match result {
        SyncResult::Success => ("success", 0),
        SyncResult::Failure => ("failure", 1),
        SyncResult::Cancelled => ("cancelled", 130),
    };
    if json {
        print_json(&serde_json::json!({ "result": name }))?;
    } else {
        println!("result: {name}");
    }
    Ok(code)
}

fn print_pending(file: &Path, pending: Option<&BTreeSet<Label>>, json: bool) -> Result<()> {
    if json {
        let pending = pending.map(|labels| labels.iter().map(Label::to_string).collect::<Vec<_>>());
        return print_json(&serde_json::json!({ "file": file, "pending": pending }));
    }
    match pending {
        None => println!("{}: not in the project", file.display()),
        Some(labels) if labels.is_empty() => println!("{}: ready for analysis", file.display()),
        Some(labels) => {
            println!("{}: {} pending", file.display(), labels.len());
            for label in labels {
                println!("  {label}");
            }
        }
    }
    Ok(())
}

fn print_targets(file: &Path, targets: &TargetsToBuild, json: bool) -> Result<()> {
    let kind = match targets {
        TargetsToBuild::None => "none",
        TargetsToBuild::SourceFile(_) => "source_file",
        TargetsToBuild::BuildFile(_) => "build_file",
    };
    let labels = targets
        .targets()
        .iter()
        .map(Label::to_string)
        .collect::<Vec<_>>();
    if json {
        return print_json(&serde_json::json!({ "file": file, "kind": kind, "targets": labels }));
    }
    println!("{} ({kind})", file.display());
    for label in labels {
        println!("  {label}");
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value)?;
    println!("{out}");
    Ok(())
}
