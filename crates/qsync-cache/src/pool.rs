use qsync_config::{DEFAULT_COPY_THREADS, MAX_COPY_THREADS};
use rayon::prelude::*;
use std::sync::Arc;

/// Bounded pool running cache file copies and deletions.
#[derive(Clone)]
pub struct CopyPool {
    inner: Arc<Inner>,
}

enum Inner {
    Rayon(rayon::ThreadPool),
    Inline,
}

impl CopyPool {
    pub fn new(threads: usize) -> Self {
        let mut threads = threads.clamp(1, MAX_COPY_THREADS);
        let inner = loop {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|idx| format!("qsync-copy-{idx}"))
                .build()
            {
                Ok(pool) => break Inner::Rayon(pool),
                // Thread limits in constrained environments: retry with fewer threads.
                Err(_) if threads > 1 => threads = (threads / 2).max(1),
                Err(err) => {
                    tracing::warn!(
                        target = "qsync.cache",
                        error = %err,
                        "failed to create copy pool; copying inline"
                    );
                    break Inner::Inline;
                }
            }
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Copies run on the calling thread.
    pub fn inline() -> Self {
        Self {
            inner: Arc::new(Inner::Inline),
        }
    }

    /// Apply `op` to every item on the pool and wait for all of them.
    pub(crate) fn filter_map<T, R>(&self, items: &[T], op: impl Fn(&T) -> Option<R> + Sync) -> Vec<R>
    where
        T: Sync,
        R: Send,
    {
        match &*self.inner {
            Inner::Rayon(pool) => pool.install(|| items.par_iter().filter_map(&op).collect()),
            Inner::Inline => items.iter().filter_map(op).collect(),
        }
    }

    pub fn threads(&self) -> usize {
        match &*self.inner {
            Inner::Rayon(pool) => pool.current_num_threads(),
            Inner::Inline => 1,
        }
    }
}

impl Default for CopyPool {
    fn default() -> Self {
        Self::new(DEFAULT_COPY_THREADS)
    }
}

impl std::fmt::Debug for CopyPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CopyPool")
            .field("threads", &self.threads())
            .finish()
    }
}
