use crate::{context::SyncContext, error::SyncError, providers::VcsStateProvider};
use qsync_build::CommandRunner;
use qsync_core::{FileOperation, VcsState, WorkspaceFileChange};
use qsync_process::RunOptions;
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

const GIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Reads the upstream revision and working set from git.
///
/// Outside a git checkout, or when git fails, the state is unknown (`None`).
pub struct GitVcsStateProvider {
    workspace_root: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl GitVcsStateProvider {
    pub fn new(workspace_root: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            runner,
        }
    }

    fn git(&self, ctx: &SyncContext, args: &[&str]) -> Result<Option<String>, SyncError> {
        let args = args.iter().map(|arg| arg.to_string()).collect::<Vec<_>>();
        let opts = RunOptions {
            timeout: Some(GIT_TIMEOUT),
            cancellation: Some(ctx.cancellation().clone()),
            ..RunOptions::default()
        };
        let output = self
            .runner
            .run(&self.workspace_root, "git", &args, opts)
            .map_err(|err| SyncError::Vcs(format!("git {}: {err}", args.join(" "))))?;
        if output.cancelled {
            return Err(SyncError::Cancelled);
        }
        if output.exit_code != Some(0) {
            tracing::debug!(
                target = "qsync.vcs",
                args = %args.join(" "),
                exit_code = ?output.exit_code,
                stderr = %output.stderr.trim(),
                "git command failed"
            );
            return Ok(None);
        }
        Ok(Some(output.stdout))
    }
}

impl VcsStateProvider for GitVcsStateProvider {
    fn vcs_state(&self, ctx: &SyncContext) -> Result<Option<VcsState>, SyncError> {
        let revision = match self.git(ctx, &["merge-base", "HEAD", "@{upstream}"])? {
            Some(revision) => revision,
            // No upstream configured: fall back to the checked out commit.
            None => match self.git(ctx, &["rev-parse", "HEAD"])? {
                Some(revision) => revision,
                None => return Ok(None),
            },
        };
        let Some(status) =
            self.git(ctx, &["status", "--porcelain=v1", "--untracked-files=all"])?
        else {
            return Ok(None);
        };
        Ok(Some(VcsState {
            upstream_revision: revision.trim().to_string(),
            working_set: parse_porcelain(&status),
        }))
    }
}

/// Parse `git status --porcelain=v1` into workspace file changes.
pub fn parse_porcelain(status: &str) -> BTreeSet<WorkspaceFileChange> {
    let mut changes = BTreeSet::new();
    for line in status.lines() {
        let (Some(code), Some(rest)) = (line.get(..2), line.get(2..)) else {
            tracing::debug!(target = "qsync.vcs", line, "skipping malformed status line");
            continue;
        };
        let path = rest.trim_start();
        if path.is_empty() {
            continue;
        }
        let mut chars = code.chars();
        let (x, y) = (chars.next().unwrap_or(' '), chars.next().unwrap_or(' '));

        if x == 'R' || x == 'C' {
            if let Some((from, to)) = path.split_once(" -> ") {
                if x == 'R' {
                    changes.insert(WorkspaceFileChange::new(
                        FileOperation::Delete,
                        unquote(from),
                    ));
                }
                changes.insert(WorkspaceFileChange::new(FileOperation::Add, unquote(to)));
                continue;
            }
        }

        let operation = match (x, y) {
            ('?', '?') | ('A', _) => FileOperation::Add,
            ('D', _) | (_, 'D') => FileOperation::Delete,
            _ => FileOperation::Modify,
        };
        changes.insert(WorkspaceFileChange::new(operation, unquote(path)));
    }
    changes
}

fn unquote(path: &str) -> PathBuf {
    let path = path.trim();
    let path = path
        .strip_prefix('"')
        .and_then(|p| p.strip_suffix('"'))
        .unwrap_or(path);
    Path::new(path).to_path_buf()
}
