//! The JSON snapshot file behind the in-memory deal store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bondflow_storage::{InMemoryDealStore, StoreSnapshot};
use bondflow_workflow::{EngineConfig, MoveExecutor};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// An executor over a store loaded from (and saved back to) a snapshot file.
pub(crate) struct Session {
    pub(crate) executor: MoveExecutor<InMemoryDealStore>,
    store: Arc<InMemoryDealStore>,
    path: Option<PathBuf>,
    /// Contents as of the last successful save.
    saved: Mutex<StoreSnapshot>,
}

impl Session {
    /// Open `path`. A missing file, or no path at all, starts an empty store.
    pub(crate) fn open(path: Option<&Path>, engine: EngineConfig) -> Result<Self, String> {
        let snapshot = match path {
            Some(path) => read_snapshot(path)?,
            None => StoreSnapshot::default(),
        };
        if let Some(path) = path {
            info!(path = %path.display(), deals = snapshot.deals.len(), "store loaded");
        }
        let store = Arc::new(InMemoryDealStore::from_snapshot(snapshot.clone()));
        Ok(Self {
            executor: MoveExecutor::new(store.clone(), engine),
            store,
            path: path.map(Path::to_path_buf),
            saved: Mutex::new(snapshot),
        })
    }

    /// Write the store back to its file. A session without a file is a no-op.
    ///
    /// On failure the in-memory store is rolled back to the last saved
    /// contents, so nothing unsaved stays visible.
    pub(crate) async fn save(&self) -> Result<(), String> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut saved = self.saved.lock().await;
        let snapshot = self.store.snapshot().await;
        match write_snapshot(path, &snapshot) {
            Ok(()) => {
                debug!(path = %path.display(), "store saved");
                *saved = snapshot;
                Ok(())
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "store not saved; rolling back");
                self.store.restore(saved.clone()).await;
                Err(e)
            }
        }
    }
}

pub(crate) fn read_snapshot(path: &Path) -> Result<StoreSnapshot, String> {
    if !path.exists() {
        return Ok(StoreSnapshot::default());
    }
    let contents = std::fs::read_to_string(path)
        .map_err(|e| format!("error reading store '{}': {}", path.display(), e))?;
    if contents.trim().is_empty() {
        return Ok(StoreSnapshot::default());
    }
    serde_json::from_str(&contents)
        .map_err(|e| format!("error parsing store '{}': {}", path.display(), e))
}

pub(crate) fn write_snapshot(path: &Path, snapshot: &StoreSnapshot) -> Result<(), String> {
    let json = serde_json::to_string_pretty(snapshot)
        .map_err(|e| format!("error serializing store: {}", e))?;
    // Write beside the target, then rename, so readers never see a torn file.
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)
        .map_err(|e| format!("error writing store '{}': {}", tmp.display(), e))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| format!("error writing store '{}': {}", path.display(), e))
}
