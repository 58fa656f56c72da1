//! Top-level coordinator: owns the loaded project and runs every sync or build operation on
//! a dedicated worker thread, one at a time.

use crate::{
    context::{OutputSink, SyncContext},
    error::SyncError,
    loader::ProjectLoader,
    project::QuerySyncProject,
    snapshot_holder::SnapshotHolder,
    status::{StatusReporter, SyncMode, SyncResult, SyncStatus, TaskOrigin},
    tracker::DependencyTracker,
};
use parking_lot::{Condvar, Mutex};
use qsync_core::{Label, TargetsToBuild};
use qsync_process::CancellationToken;
use std::{
    any::Any,
    collections::{BTreeSet, VecDeque},
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectState {
    NotLoaded,
    Loading,
    Loaded,
}

/// Handle to a submitted operation.
#[derive(Debug)]
pub struct SyncTask {
    rx: oneshot::Receiver<SyncResult>,
    cancel: CancellationToken,
}

impl SyncTask {
    /// Block until the operation finishes.
    ///
    /// Must not be called from within an async runtime; use [`SyncTask::finished`] there.
    pub fn wait(self) -> SyncResult {
        self.rx.blocking_recv().unwrap_or(SyncResult::Cancelled)
    }

    pub async fn finished(self) -> SyncResult {
        self.rx.await.unwrap_or(SyncResult::Cancelled)
    }

    /// The result, if the operation has finished.
    pub fn try_result(&mut self) -> Option<SyncResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            // Dropped before it ran: the manager shut down.
            Err(oneshot::error::TryRecvError::Closed) => Some(SyncResult::Cancelled),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

type Body = Box<dyn FnOnce(&Inner, &SyncContext) -> Result<(), SyncError> + Send>;

struct Job {
    mode: SyncMode,
    origin: TaskOrigin,
    ctx: SyncContext,
    body: Body,
    done: oneshot::Sender<SyncResult>,
}

#[derive(Default)]
struct Queue {
    jobs: VecDeque<Job>,
    running: Option<CancellationToken>,
    shutdown: bool,
}

struct Loaded {
    state: ProjectState,
    project: Option<Arc<QuerySyncProject>>,
}

struct Inner {
    loader: ProjectLoader,
    status: Arc<dyn SyncStatus>,
    sink: Option<Arc<dyn OutputSink>>,
    loaded: Mutex<Loaded>,
    queue: Mutex<Queue>,
    wake: Condvar,
}

pub struct QuerySyncManager {
    inner: Arc<Inner>,
}

impl QuerySyncManager {
    /// Start the manager and its worker thread. Nothing is loaded until an operation asks.
    pub fn new(
        loader: ProjectLoader,
        status: Arc<dyn SyncStatus>,
        sink: Option<Arc<dyn OutputSink>>,
    ) -> Result<Self, SyncError> {
        let inner = Arc::new(Inner {
            loader,
            status,
            sink,
            loaded: Mutex::new(Loaded {
                state: ProjectState::NotLoaded,
                project: None,
            }),
            queue: Mutex::new(Queue::default()),
            wake: Condvar::new(),
        });

        let for_thread = inner.clone();
        std::thread::Builder::new()
            .name("qsync-worker".to_string())
            .spawn(move || worker_loop(for_thread))?;

        Ok(Self { inner })
    }

    pub fn state(&self) -> ProjectState {
        self.inner.loaded.lock().state
    }

    pub fn loaded_project(&self) -> Option<Arc<QuerySyncProject>> {
        self.inner.loaded.lock().project.clone()
    }

    /// Snapshots published by any project this manager loads.
    pub fn snapshots(&self) -> &Arc<SnapshotHolder> {
        self.inner.loader.snapshots()
    }

    /// Load the project from scratch, whatever the current state.
    pub fn reload_project(&self, origin: TaskOrigin) -> SyncTask {
        self.submit(SyncMode::Load, origin, Box::new(load))
    }

    pub fn on_startup(&self) -> SyncTask {
        self.reload_project(TaskOrigin::Startup)
    }

    /// Load when nothing is loaded, reload when the definition changed, otherwise re-query the
    /// whole project.
    pub fn full_sync(&self, origin: TaskOrigin) -> SyncTask {
        self.submit(
            SyncMode::Full,
            origin,
            Box::new(|inner: &Inner, ctx: &SyncContext| match inner.project() {
                None => load(inner, ctx),
                Some(project) if !project.is_definition_current()? => {
                    ctx.info("Project definition changed; reloading");
                    load(inner, ctx)
                }
                Some(project) => project.full_sync(ctx),
            }),
        )
    }

    /// Re-query only what changed. Reloads instead when the definition changed.
    pub fn delta_sync(&self, origin: TaskOrigin) -> Result<SyncTask, SyncError> {
        self.submit_loaded(SyncMode::Delta, origin, |inner, ctx, project| {
            if !project.is_definition_current()? {
                ctx.info("Project definition changed; reloading");
                return load(inner, ctx);
            }
            project.delta_sync(ctx)
        })
    }

    /// Build the dependencies of `targets` so their files can be analysed.
    pub fn enable_analysis(
        &self,
        targets: BTreeSet<Label>,
        origin: TaskOrigin,
    ) -> Result<SyncTask, SyncError> {
        self.submit_loaded(SyncMode::Analysis, origin, move |_, ctx, project| {
            project.enable_analysis(ctx, &targets)
        })
    }

    /// Enable analysis for every project target depending on `targets`.
    pub fn enable_analysis_for_reverse_deps(
        &self,
        targets: BTreeSet<Label>,
        origin: TaskOrigin,
    ) -> Result<SyncTask, SyncError> {
        self.submit_loaded(SyncMode::Analysis, origin, move |_, ctx, project| {
            let rdeps = project.get_targets_depending_on(&targets);
            if rdeps.is_empty() {
                ctx.info("No project targets depend on the given targets");
                return Ok(());
            }
            project.enable_analysis(ctx, &rdeps)
        })
    }

    /// Build the dependencies of the targets owning `paths` in one build.
    pub fn build_dependencies_for_files(
        &self,
        paths: Vec<PathBuf>,
        origin: TaskOrigin,
    ) -> Result<SyncTask, SyncError> {
        self.submit_loaded(SyncMode::Analysis, origin, move |_, ctx, project| {
            project
                .dependency_tracker()
                .build_dependencies_for_file(ctx, &paths)
        })
    }

    pub fn generate_render_jar(
        &self,
        paths: Vec<PathBuf>,
        origin: TaskOrigin,
    ) -> Result<SyncTask, SyncError> {
        self.submit_loaded(SyncMode::RenderJar, origin, move |_, ctx, project| {
            project.enable_render_jar(ctx, &paths)
        })
    }

    pub fn reset_dependency_cache(&self, origin: TaskOrigin) -> Result<SyncTask, SyncError> {
        self.submit_loaded(SyncMode::ResetCache, origin, |_, ctx, project| {
            project.dependency_tracker().reset_cache(ctx)
        })
    }

    pub fn get_targets_to_build(&self, path: &Path) -> TargetsToBuild {
        self.loaded_project()
            .map(|project| project.get_project_targets(path))
            .unwrap_or(TargetsToBuild::NONE)
    }

    pub fn can_enable_analysis_for(&self, path: &Path) -> bool {
        self.loaded_project()
            .is_some_and(|project| project.can_enable_analysis_for(path))
    }

    pub fn is_ready_for_analysis(&self, path: &Path) -> bool {
        self.loaded_project()
            .is_some_and(|project| project.dependency_tracker().is_ready_for_analysis(path))
    }

    pub fn get_dependency_tracker(&self) -> Option<Arc<DependencyTracker>> {
        self.loaded_project()
            .map(|project| project.dependency_tracker().clone())
    }

    /// Cancel the running operation and drop queued ones.
    pub fn cancel_all(&self) {
        let mut queue = self.inner.queue.lock();
        if let Some(running) = &queue.running {
            running.cancel();
        }
        queue.jobs.clear();
    }

    fn submit_loaded<F>(
        &self,
        mode: SyncMode,
        origin: TaskOrigin,
        body: F,
    ) -> Result<SyncTask, SyncError>
    where
        F: FnOnce(&Inner, &SyncContext, &QuerySyncProject) -> Result<(), SyncError>
            + Send
            + 'static,
    {
        if self.loaded_project().is_none() {
            return Err(SyncError::ProjectNotLoaded);
        }
        Ok(self.submit(
            mode,
            origin,
            Box::new(move |inner: &Inner, ctx: &SyncContext| {
                let project = inner.project().ok_or(SyncError::ProjectNotLoaded)?;
                body(inner, ctx, &project)
            }),
        ))
    }

    fn submit(&self, mode: SyncMode, origin: TaskOrigin, body: Body) -> SyncTask {
        let cancel = CancellationToken::new();
        let ctx = match &self.inner.sink {
            Some(sink) => SyncContext::with_sink(cancel.clone(), sink.clone()),
            None => SyncContext::new(cancel.clone()),
        };
        let (done, rx) = oneshot::channel();

        let mut queue = self.inner.queue.lock();
        queue.jobs.push_back(Job {
            mode,
            origin,
            ctx,
            body,
            done,
        });
        tracing::debug!(
            target = "qsync.sync",
            %mode,
            ?origin,
            queued = queue.jobs.len(),
            "operation submitted"
        );
        self.inner.wake.notify_all();

        SyncTask { rx, cancel }
    }
}

impl Drop for QuerySyncManager {
    fn drop(&mut self) {
        let mut queue = self.inner.queue.lock();
        queue.shutdown = true;
        if let Some(running) = &queue.running {
            running.cancel();
        }
        queue.jobs.clear();
        self.inner.wake.notify_all();
    }
}

impl std::fmt::Debug for QuerySyncManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuerySyncManager")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn project(&self) -> Option<Arc<QuerySyncProject>> {
        self.loaded.lock().project.clone()
    }
}

/// Load a fresh project and sync it, resuming from the stored state when there is one.
///
/// The previously loaded project stays in place if anything fails.
fn load(inner: &Inner, ctx: &SyncContext) -> Result<(), SyncError> {
    let previous = {
        let mut loaded = inner.loaded.lock();
        loaded.state = ProjectState::Loading;
        loaded.project.is_some()
    };
    let restore = || {
        inner.loaded.lock().state = if previous {
            ProjectState::Loaded
        } else {
            ProjectState::NotLoaded
        };
    };

    match load_and_sync(inner, ctx) {
        Ok(project) => {
            let mut loaded = inner.loaded.lock();
            loaded.project = Some(Arc::new(project));
            loaded.state = ProjectState::Loaded;
            Ok(())
        }
        Err(err) => {
            restore();
            Err(err)
        }
    }
}

fn load_and_sync(inner: &Inner, ctx: &SyncContext) -> Result<QuerySyncProject, SyncError> {
    let project = inner.loader.load_project(ctx)?;
    let last = match project.read_snapshot_from_disk(ctx) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            ctx.warn(format!("Could not read stored sync state: {err}"));
            None
        }
    };
    project.sync(ctx, last.as_ref().map(|snapshot| snapshot.query_data()))?;
    Ok(project)
}

fn worker_loop(inner: Arc<Inner>) {
    loop {
        let job = {
            let mut queue = inner.queue.lock();
            loop {
                if queue.shutdown {
                    return;
                }
                if let Some(job) = queue.jobs.pop_front() {
                    queue.running = Some(job.ctx.cancellation().clone());
                    break job;
                }
                inner.wake.wait(&mut queue);
            }
        };

        let result = run(&inner, job.mode, job.origin, &job.ctx, job.body);
        inner.queue.lock().running = None;
        // The caller may have dropped its handle.
        let _ = job.done.send(result);
    }
}

/// Run one operation, reporting its start and end to the status collaborator exactly once.
fn run(
    inner: &Inner,
    mode: SyncMode,
    origin: TaskOrigin,
    ctx: &SyncContext,
    body: Body,
) -> SyncResult {
    let reporter = StatusReporter::start(inner.status.clone(), mode, origin);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(inner, ctx)));

    let result = match outcome {
        Ok(Ok(())) if ctx.is_cancelled() => SyncResult::Cancelled,
        Ok(Ok(())) if ctx.has_errors() => SyncResult::Failure,
        Ok(Ok(())) => SyncResult::Success,
        Ok(Err(err)) => {
            ctx.handle_error(&err);
            if err.is_cancelled() || ctx.is_cancelled() {
                SyncResult::Cancelled
            } else {
                SyncResult::Failure
            }
        }
        Err(payload) => {
            ctx.error(format!("{mode} panicked: {}", panic_message(&*payload)));
            SyncResult::Failure
        }
    };
    tracing::info!(target = "qsync.sync", %mode, ?result, "operation finished");
    reporter.end(result);
    result
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
