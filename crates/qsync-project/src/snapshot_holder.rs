use parking_lot::{Mutex, RwLock};
use qsync_core::BlazeProjectSnapshot;
use std::sync::Arc;

/// Notified after a new snapshot is published.
pub trait SnapshotListener: Send + Sync {
    fn on_new_snapshot(&self, snapshot: &Arc<BlazeProjectSnapshot>);
}

/// The current snapshot. Readers get the old or the new one, never a mix.
#[derive(Default)]
pub struct SnapshotHolder {
    current: RwLock<Option<Arc<BlazeProjectSnapshot>>>,
    listeners: Mutex<Vec<Arc<dyn SnapshotListener>>>,
}

impl SnapshotHolder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Arc<BlazeProjectSnapshot>> {
        self.current.read().clone()
    }

    pub fn set(&self, snapshot: Arc<BlazeProjectSnapshot>) {
        *self.current.write() = Some(snapshot.clone());
        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            listener.on_new_snapshot(&snapshot);
        }
    }

    pub fn clear(&self) {
        *self.current.write() = None;
    }

    pub fn add_listener(&self, listener: Arc<dyn SnapshotListener>) {
        self.listeners.lock().push(listener);
    }
}

impl std::fmt::Debug for SnapshotHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotHolder")
            .field("loaded", &self.current.read().is_some())
            .finish()
    }
}
