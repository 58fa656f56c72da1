use qsync_process::{run_command, CommandSpec, RunOptions};
use std::{io, path::Path};

/// Outcome of a finished build-tool process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Retained output, possibly truncated. Complete output is delivered through
    /// [`RunOptions::lines`].
    pub stdout: String,
    pub stderr: String,
    pub cancelled: bool,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success() -> Self {
        Self {
            exit_code: Some(0),
            ..Self::default()
        }
    }

    pub fn with_exit_code(exit_code: i32) -> Self {
        Self {
            exit_code: Some(exit_code),
            ..Self::default()
        }
    }
}

/// Runs build-tool commands.
///
/// Implementations must forward output lines to `opts.lines` when set and honour
/// `opts.cancellation`. Tests substitute a recording fake.
pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        cwd: &Path,
        program: &str,
        args: &[String],
        opts: RunOptions,
    ) -> io::Result<CommandOutput>;
}

#[derive(Debug, Default, Clone)]
pub struct DefaultCommandRunner;

impl CommandRunner for DefaultCommandRunner {
    fn run(
        &self,
        cwd: &Path,
        program: &str,
        args: &[String],
        opts: RunOptions,
    ) -> io::Result<CommandOutput> {
        let command = CommandSpec::new(cwd, program).args(args.iter().cloned());
        let result = run_command(&command, opts)?;
        Ok(CommandOutput {
            exit_code: result.exit_code(),
            stdout: result.output.stdout,
            stderr: result.output.stderr,
            cancelled: result.cancelled,
            timed_out: result.timed_out,
        })
    }
}
