//! Subprocess execution for build-tool invocations.
//!
//! Bazel output can be arbitrarily large, so stdout/stderr are never buffered in full: each
//! stream is forwarded line by line to an optional [`LineConsumer`] while at most
//! [`RunOptions::max_bytes`] bytes per stream are retained for diagnostics. Runs can be bounded
//! by a wall-clock timeout and interrupted through a [`CancellationToken`]; either way the
//! whole process tree is terminated.

mod kill;
mod lines;

pub use lines::{LineConsumer, OutputStream, RecordingConsumer};
pub use tokio_util::sync::CancellationToken;

use std::{
    fmt, io,
    path::PathBuf,
    process::{Command, ExitStatus, Stdio},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

/// Retained stdout/stderr of a command, truncated to [`RunOptions::max_bytes`] per stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundedOutput {
    pub stdout: String,
    pub stderr: String,
    pub truncated: bool,
}

#[derive(Clone)]
pub struct RunOptions {
    /// Kill the process tree once this much wall-clock time has elapsed.
    pub timeout: Option<Duration>,
    /// Bytes retained per stream. Streamed lines are not subject to this limit.
    pub max_bytes: usize,
    pub cancellation: Option<CancellationToken>,
    /// Time between SIGTERM and SIGKILL when terminating.
    pub kill_grace: Duration,
    /// Receives every output line as it is produced.
    pub lines: Option<Arc<dyn LineConsumer>>,
    /// Extra environment variables for the child.
    pub env: Vec<(String, String)>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            max_bytes: 4 * 1024 * 1024,
            cancellation: None,
            kill_grace: Duration::from_millis(250),
            lines: None,
            env: Vec::new(),
        }
    }
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("timeout", &self.timeout)
            .field("max_bytes", &self.max_bytes)
            .field("cancellable", &self.cancellation.is_some())
            .field("kill_grace", &self.kill_grace)
            .field("streaming", &self.lines.is_some())
            .field("env", &self.env)
            .finish()
    }
}

/// A program, its arguments and the directory it runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub cwd: PathBuf,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(cwd: impl Into<PathBuf>, program: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg.replace('\'', "'\\''"))?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub status: ExitStatus,
    pub output: BoundedOutput,
    pub timed_out: bool,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl CommandResult {
    /// The exit code, or `None` when the process was killed by a signal.
    pub fn exit_code(&self) -> Option<i32> {
        self.status.code()
    }
}

/// Run `command`, returning its status and bounded output whatever the exit code.
///
/// Timeouts and cancellation terminate the process tree and are reported through
/// [`CommandResult::timed_out`] and [`CommandResult::cancelled`].
pub fn run_command(command: &CommandSpec, opts: RunOptions) -> io::Result<CommandResult> {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .current_dir(&command.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, value) in &opts.env {
        cmd.env(key, value);
    }
    kill::isolate_process_group(&mut cmd);

    tracing::debug!(
        target = "qsync.process",
        command = %command,
        cwd = %command.cwd.display(),
        "spawning"
    );
    let start = Instant::now();
    let mut child = cmd.spawn()?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("child stdout was not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("child stderr was not captured"))?;

    let max_bytes = opts.max_bytes;
    let stdout_lines = opts.lines.clone();
    let stderr_lines = opts.lines.clone();
    let stdout_reader = thread::spawn(move || {
        lines::pump(stdout, OutputStream::Stdout, max_bytes, stdout_lines.as_deref())
    });
    let stderr_reader = thread::spawn(move || {
        lines::pump(stderr, OutputStream::Stderr, max_bytes, stderr_lines.as_deref())
    });

    let mut timed_out = false;
    let mut cancelled = false;
    let status = if opts.timeout.is_none() && opts.cancellation.is_none() {
        child.wait()?
    } else {
        let poll = Duration::from_millis(50);
        loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if opts
                .cancellation
                .as_ref()
                .is_some_and(CancellationToken::is_cancelled)
            {
                cancelled = true;
                break kill::terminate(&mut child, opts.kill_grace)?;
            }
            let wait = match opts.timeout {
                Some(timeout) if start.elapsed() >= timeout => {
                    timed_out = true;
                    break kill::terminate(&mut child, opts.kill_grace)?;
                }
                Some(timeout) => poll.min(timeout.saturating_sub(start.elapsed())),
                None => poll,
            };
            thread::sleep(wait);
        }
    };

    let (stdout, stdout_truncated) = lines::join(stdout_reader, OutputStream::Stdout)?;
    let (stderr, stderr_truncated) = lines::join(stderr_reader, OutputStream::Stderr)?;
    let elapsed = start.elapsed();

    tracing::debug!(
        target = "qsync.process",
        command = %command,
        status = %status,
        timed_out,
        cancelled,
        elapsed_ms = elapsed.as_millis() as u64,
        "process finished"
    );

    Ok(CommandResult {
        status,
        output: BoundedOutput {
            stdout,
            stderr,
            truncated: stdout_truncated || stderr_truncated,
        },
        timed_out,
        cancelled,
        elapsed,
    })
}
