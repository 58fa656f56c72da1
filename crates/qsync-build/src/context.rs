use qsync_process::{CancellationToken, LineConsumer, OutputStream};
use std::{fmt, sync::Arc};

/// Per-invocation state handed down from the caller: where console output goes and how to
/// cancel.
#[derive(Clone, Default)]
pub struct InvocationContext {
    pub cancellation: CancellationToken,
    pub console: Option<Arc<dyn LineConsumer>>,
}

impl InvocationContext {
    pub fn new(cancellation: CancellationToken) -> Self {
        Self {
            cancellation,
            console: None,
        }
    }

    pub fn with_console(mut self, console: Arc<dyn LineConsumer>) -> Self {
        self.console = Some(console);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Forward a line to the console, if any.
    pub fn print(&self, line: &str) {
        if let Some(console) = &self.console {
            console.accept(OutputStream::Stderr, line);
        }
    }
}

impl fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationContext")
            .field("cancelled", &self.cancellation.is_cancelled())
            .field("console", &self.console.is_some())
            .finish()
    }
}
