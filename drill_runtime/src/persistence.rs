//! Persistence of the whole `AppState` blob.
//!
//! `load` never fails: a missing or unreadable snapshot yields the fresh
//! default state (with default prompts), logged at warn level.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{info, warn};

use drill_engine::domain::AppState;

use crate::prompts::{fill_missing_prompts, fresh_state};
use crate::snapshot_codec::{
    encode_snapshot, export_snapshot_to_file, import_snapshot_from_file, restore_snapshot,
    SnapshotError,
};

pub trait Persistence: Send {
    fn load(&self) -> AppState;
    fn save(&self, state: &AppState) -> Result<(), SnapshotError>;
}

/// Snapshot file on disk.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Persistence for FileStore {
    fn load(&self) -> AppState {
        if !self.path.exists() {
            info!(path = %self.path.display(), "no snapshot, starting fresh");
            return fresh_state();
        }
        match import_snapshot_from_file(&self.path) {
            Ok(mut state) => {
                let added = fill_missing_prompts(&mut state);
                info!(
                    path = %self.path.display(),
                    lists = state.lists.len(),
                    prompts_added = added,
                    "snapshot loaded"
                );
                state
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "discarding unreadable snapshot");
                fresh_state()
            }
        }
    }

    fn save(&self, state: &AppState) -> Result<(), SnapshotError> {
        export_snapshot_to_file(state, &self.path)
    }
}

/// In-memory snapshot slot, for tests and embedders without a disk.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blob: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the slot with raw snapshot text.
    pub fn with_blob(blob: impl Into<String>) -> Self {
        Self {
            blob: Mutex::new(Some(blob.into())),
        }
    }

    /// The last saved snapshot text, if any.
    pub fn blob(&self) -> Option<String> {
        self.blob.lock().ok().and_then(|b| b.clone())
    }
}

impl Persistence for MemoryStore {
    fn load(&self) -> AppState {
        let Some(blob) = self.blob() else {
            return fresh_state();
        };
        match restore_snapshot(&blob) {
            Ok(mut state) => {
                fill_missing_prompts(&mut state);
                state
            }
            Err(err) => {
                warn!(error = %err, "discarding unreadable snapshot");
                fresh_state()
            }
        }
    }

    fn save(&self, state: &AppState) -> Result<(), SnapshotError> {
        let json = encode_snapshot(state)?;
        if let Ok(mut slot) = self.blob.lock() {
            *slot = Some(json);
        }
        Ok(())
    }
}
