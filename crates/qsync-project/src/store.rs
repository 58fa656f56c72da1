use crate::error::SyncError;
use qsync_cache::{read_json, write_json};
use qsync_core::PostQuerySyncData;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File holding the persisted query state, inside the data directory.
pub const SYNC_STATE_FILE: &str = "qsyncdata.json";

const STATE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct StoredState {
    version: u32,
    data: PostQuerySyncData,
}

/// Persists [`PostQuerySyncData`] so a restart can resume with a delta sync.
#[derive(Debug, Clone)]
pub struct SyncStateStore {
    path: PathBuf,
}

impl SyncStateStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(SYNC_STATE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored state, or `None` when nothing usable was stored.
    pub fn load(&self) -> Result<Option<PostQuerySyncData>, SyncError> {
        let Some(stored) = read_json::<StoredState>(&self.path)? else {
            return Ok(None);
        };
        if stored.version != STATE_VERSION {
            tracing::info!(
                target = "qsync.sync",
                path = %self.path.display(),
                found = stored.version,
                expected = STATE_VERSION,
                "ignoring sync state written by a different version"
            );
            return Ok(None);
        }
        Ok(Some(stored.data))
    }

    pub fn save(&self, data: &PostQuerySyncData) -> Result<(), SyncError> {
        let stored = StoredState {
            version: STATE_VERSION,
            data: data.clone(),
        };
        write_json(&self.path, &stored)?;
        Ok(())
    }
}
