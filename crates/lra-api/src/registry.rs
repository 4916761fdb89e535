//! # Saga Registry
//!
//! Thread-safe map of LRA id to saga, with JSON snapshot persistence.
//!
//! Two lock levels:
//!
//! - the registry lock guards the map itself and is held only long enough
//!   to clone an `Arc` in or out;
//! - each saga has its own lock, held while a state machine method runs.
//!
//! Both are `parking_lot` locks and neither is ever held across `.await`.
//! When both are needed the saga lock is taken first.
//!
//! ## Snapshot format
//!
//! ```json
//! { "version": 1, "saved_at": "2026-01-01T00:00:00Z", "lras": [ ... ] }
//! ```
//!
//! Snapshots are written to a temporary file in the target directory and
//! renamed over the old one, so a crash mid-write never leaves a truncated
//! snapshot behind.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use lra_core::{LraError, LraId};
use lra_state::Lra;

/// Snapshot format version written by this build.
pub const SNAPSHOT_VERSION: u32 = 1;

/// A registered saga behind its own lock.
pub type SharedLra = Arc<Mutex<Lra>>;

/// On-disk registry snapshot.
#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub lras: Vec<Lra>,
}

/// The saga registry.
#[derive(Debug, Default)]
pub struct Registry {
    lras: Mutex<HashMap<LraId, SharedLra>>,
    snapshot_path: Option<PathBuf>,
}

impl Registry {
    /// Create an empty, in-memory registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry that saves to `path`.
    pub fn with_snapshot_path(path: impl Into<PathBuf>) -> Self {
        Self {
            lras: Mutex::new(HashMap::new()),
            snapshot_path: Some(path.into()),
        }
    }

    /// Load the registry from its snapshot.
    ///
    /// A missing snapshot yields an empty registry. An unreadable one is
    /// logged and also yields an empty registry.
    pub fn load(snapshot_path: Option<PathBuf>) -> Self {
        let Some(path) = snapshot_path else {
            return Self::new();
        };
        let registry = Self::with_snapshot_path(path.clone());
        match read_snapshot(&path) {
            Ok(Some(snapshot)) => {
                let count = snapshot.lras.len();
                for mut lra in snapshot.lras {
                    lra.reset_in_flight();
                    registry.put(lra);
                }
                tracing::info!(path = %path.display(), count, "registry loaded from snapshot");
            }
            Ok(None) => {
                tracing::info!(path = %path.display(), "no snapshot found, starting empty");
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "failed to load snapshot, starting empty");
            }
        }
        registry
    }

    /// Look up a saga.
    pub fn get(&self, id: &LraId) -> Option<SharedLra> {
        self.lras.lock().get(id).cloned()
    }

    /// Register a saga, replacing any previous one with the same id.
    pub fn put(&self, lra: Lra) -> SharedLra {
        let id = lra.id();
        let shared = Arc::new(Mutex::new(lra));
        self.lras.lock().insert(id, Arc::clone(&shared));
        shared
    }

    /// Remove a saga.
    pub fn remove(&self, id: &LraId) -> Option<SharedLra> {
        self.lras.lock().remove(id)
    }

    /// Ids of all registered sagas at this instant.
    pub fn ids(&self) -> Vec<LraId> {
        self.lras.lock().keys().copied().collect()
    }

    /// Copies of all registered sagas, sorted by creation time.
    pub fn snapshot(&self) -> Vec<Lra> {
        let shared: Vec<SharedLra> = self.lras.lock().values().cloned().collect();
        let mut lras: Vec<Lra> = shared.iter().map(|l| l.lock().clone()).collect();
        lras.sort_by_key(|l| l.created_at());
        lras
    }

    /// Number of registered sagas.
    pub fn len(&self) -> usize {
        self.lras.lock().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Where snapshots are written, if anywhere.
    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// Write a snapshot. A registry without a snapshot path does nothing.
    pub fn save(&self) -> Result<(), LraError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            lras: self.snapshot(),
        };
        write_snapshot(path, &snapshot)?;
        tracing::debug!(path = %path.display(), count = snapshot.lras.len(), "registry saved");
        Ok(())
    }

    /// Write a snapshot, logging instead of returning failures.
    pub fn save_or_log(&self) {
        if let Err(e) = self.save() {
            tracing::error!(error = %e, "failed to save registry snapshot");
        }
    }
}

/// Read a snapshot file. `Ok(None)` when it does not exist.
pub fn read_snapshot(path: &Path) -> Result<Option<Snapshot>, LraError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let snapshot: Snapshot = serde_json::from_str(&raw)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(LraError::Persistence(format!(
            "unsupported snapshot version {} (expected {SNAPSHOT_VERSION})",
            snapshot.version
        )));
    }
    Ok(Some(snapshot))
}

fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<(), LraError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, snapshot)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| LraError::Persistence(format!("rename into {}: {e}", path.display())))?;
    Ok(())
}
