use parking_lot::Mutex;
use std::{fmt, sync::Arc};

/// Who asked for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskOrigin {
    Startup,
    UserAction,
    Automatic,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncMode {
    Load,
    Full,
    Delta,
    Analysis,
    RenderJar,
    ResetCache,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncMode::Load => "load",
            SyncMode::Full => "full sync",
            SyncMode::Delta => "delta sync",
            SyncMode::Analysis => "enable analysis",
            SyncMode::RenderJar => "render jar",
            SyncMode::ResetCache => "reset cache",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncResult {
    Success,
    Failure,
    Cancelled,
}

impl SyncResult {
    pub fn is_success(self) -> bool {
        self == SyncResult::Success
    }
}

/// Observer of operation start and end; every started operation is ended exactly once.
pub trait SyncStatus: Send + Sync {
    fn sync_started(&self, mode: SyncMode, origin: TaskOrigin);
    fn sync_ended(&self, mode: SyncMode, result: SyncResult);
}

/// Tracks whether an operation is running and how the last one ended.
#[derive(Debug, Default)]
pub struct DefaultSyncStatus {
    state: Mutex<StatusState>,
}

#[derive(Debug, Default)]
struct StatusState {
    running: Option<SyncMode>,
    last: Option<(SyncMode, SyncResult)>,
}

impl DefaultSyncStatus {
    pub fn sync_in_progress(&self) -> bool {
        self.state.lock().running.is_some()
    }

    pub fn last_result(&self) -> Option<(SyncMode, SyncResult)> {
        self.state.lock().last
    }
}

impl SyncStatus for DefaultSyncStatus {
    fn sync_started(&self, mode: SyncMode, origin: TaskOrigin) {
        tracing::debug!(target = "qsync.sync", %mode, ?origin, "operation started");
        self.state.lock().running = Some(mode);
    }

    fn sync_ended(&self, mode: SyncMode, result: SyncResult) {
        tracing::debug!(target = "qsync.sync", %mode, ?result, "operation ended");
        let mut state = self.state.lock();
        state.running = None;
        state.last = Some((mode, result));
    }
}

/// Ends the operation on drop if it was not ended explicitly.
pub(crate) struct StatusReporter {
    status: Arc<dyn SyncStatus>,
    mode: SyncMode,
    ended: bool,
}

impl StatusReporter {
    pub(crate) fn start(status: Arc<dyn SyncStatus>, mode: SyncMode, origin: TaskOrigin) -> Self {
        status.sync_started(mode, origin);
        Self {
            status,
            mode,
            ended: false,
        }
    }

    pub(crate) fn end(mut self, result: SyncResult) {
        self.ended = true;
        self.status.sync_ended(self.mode, result);
    }
}

impl Drop for StatusReporter {
    fn drop(&mut self) {
        if !self.ended {
            self.status.sync_ended(self.mode, SyncResult::Failure);
        }
    }
}
