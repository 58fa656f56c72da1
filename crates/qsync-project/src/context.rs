use crate::error::SyncError;
use parking_lot::Mutex;
use qsync_build::InvocationContext;
use qsync_process::{CancellationToken, LineConsumer, OutputStream};
use std::{fmt, sync::Arc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Info,
    Warning,
    Error,
    /// A line of build tool output.
    Process,
}

/// A message produced while an operation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintOutput {
    pub kind: OutputKind,
    pub text: String,
}

impl PrintOutput {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            kind: OutputKind::Info,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            kind: OutputKind::Warning,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: OutputKind::Error,
            text: text.into(),
        }
    }
}

/// Receives the messages of running operations (a console, a tool window, a test recorder).
pub trait OutputSink: Send + Sync {
    fn output(&self, output: &PrintOutput);
}

impl<F> OutputSink for F
where
    F: Fn(&PrintOutput) + Send + Sync,
{
    fn output(&self, output: &PrintOutput) {
        self(output)
    }
}

/// State of one sync or build operation: cancellation, output and reported errors.
#[derive(Clone)]
pub struct SyncContext {
    invocation: InvocationContext,
    shared: Arc<Shared>,
}

struct Shared {
    sink: Option<Arc<dyn OutputSink>>,
    errors: Mutex<Vec<String>>,
}

/// Forwards build tool lines into the context output.
struct ProcessConsole {
    sink: Arc<dyn OutputSink>,
}

impl LineConsumer for ProcessConsole {
    fn accept(&self, _stream: OutputStream, line: &str) {
        self.sink.output(&PrintOutput {
            kind: OutputKind::Process,
            text: line.to_string(),
        });
    }
}

impl SyncContext {
    pub fn new(cancellation: CancellationToken) -> Self {
        Self {
            invocation: InvocationContext::new(cancellation),
            shared: Arc::new(Shared {
                sink: None,
                errors: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn with_sink(cancellation: CancellationToken, sink: Arc<dyn OutputSink>) -> Self {
        let invocation = InvocationContext::new(cancellation).with_console(Arc::new(ProcessConsole {
            sink: sink.clone(),
        }));
        Self {
            invocation,
            shared: Arc::new(Shared {
                sink: Some(sink),
                errors: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Context handed to the build layer.
    pub fn invocation(&self) -> &InvocationContext {
        &self.invocation
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.invocation.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.invocation.is_cancelled()
    }

    pub fn output(&self, output: PrintOutput) {
        match output.kind {
            OutputKind::Info => tracing::info!(target = "qsync.sync", "{}", output.text),
            OutputKind::Warning => tracing::warn!(target = "qsync.sync", "{}", output.text),
            OutputKind::Error => {
                tracing::error!(target = "qsync.sync", "{}", output.text);
                self.shared.errors.lock().push(output.text.clone());
            }
            OutputKind::Process => tracing::debug!(target = "qsync.build", "{}", output.text),
        }
        if let Some(sink) = &self.shared.sink {
            sink.output(&output);
        }
    }

    pub fn info(&self, text: impl Into<String>) {
        self.output(PrintOutput::info(text));
    }

    pub fn warn(&self, text: impl Into<String>) {
        self.output(PrintOutput::warning(text));
    }

    pub fn error(&self, text: impl Into<String>) {
        self.output(PrintOutput::error(text));
    }

    /// Report a failed operation. Cancellation is not an error.
    pub fn handle_error(&self, err: &SyncError) {
        if err.is_cancelled() {
            self.info("Operation cancelled");
        } else {
            self.error(err.to_string());
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.shared.errors.lock().is_empty()
    }

    pub fn errors(&self) -> Vec<String> {
        self.shared.errors.lock().clone()
    }
}

impl Default for SyncContext {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

impl fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncContext")
            .field("cancelled", &self.is_cancelled())
            .field("errors", &self.shared.errors.lock().len())
            .finish()
    }
}
