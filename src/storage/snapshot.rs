//! JSON Snapshots
//!
//! A snapshot is the whole keyspace written to a single file, fully rewritten
//! on every save:
//!
//! ```text
//! {
//!   "session": { "value": "abc123", "expiration": 1767225600000000000 },
//!   "name":    { "value": "Ariz",   "expiration": 0 }
//! }
//! ```
//!
//! `expiration` is nanoseconds since the UNIX epoch, `0` meaning "never".
//!
//! ## Saving
//!
//! The mapping is serialized while holding the keyspace read lock, so the file
//! is always a consistent point-in-time copy. The bytes are then written to
//! `<path>.tmp` and renamed over `<path>` after the lock is released.
//! Saves on one manager are serialized, so a manual save and the periodic
//! task never write the same `.tmp` file at the same time.
//! Entries that have expired but were not swept yet are saved as well; they
//! are filtered out again on read after a reload.
//!
//! ## Loading
//!
//! A missing file is a normal first start. A file that cannot be read or
//! parsed is reported as an error, and the keyspace is left untouched: the
//! whole file is decoded before anything is inserted.
//!
//! ## Background task
//!
//! [`spawn_persistence`] saves on a fixed interval and once more when the
//! shutdown signal arrives. Failed saves are logged and counted, then retried
//! on the next tick.

use crate::storage::{Entry, Keyspace};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Errors that can occur while saving or loading a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Persistence is not configured for this store
    #[error("no snapshot file configured")]
    Disabled,

    /// The snapshot file exists but could not be read
    #[error("failed to read snapshot {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The snapshot could not be written or moved into place
    #[error("failed to write snapshot {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The keyspace could not be serialized
    #[error("failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),

    /// The snapshot file is not a valid snapshot
    #[error("malformed snapshot {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One key's entry as it appears in the snapshot file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// The stored value, verbatim
    pub value: String,
    /// Nanoseconds since the UNIX epoch, `0` for "never expires"
    #[serde(default)]
    pub expiration: i64,
}

/// Borrowed form of [`SnapshotRecord`], so saving doesn't clone every value.
#[derive(Serialize)]
struct RecordRef<'a> {
    value: &'a str,
    expiration: i64,
}

/// Converts an expiration instant to its on-disk form.
pub fn to_unix_nanos(expires_at: Option<SystemTime>) -> i64 {
    match expires_at {
        None => 0,
        Some(at) => match at.duration_since(UNIX_EPOCH) {
            // Clamp so a real expiration never collides with the "never" marker
            Ok(since) => i64::try_from(since.as_nanos()).unwrap_or(i64::MAX).max(1),
            Err(_) => 1,
        },
    }
}

/// Converts an on-disk expiration back to an instant. Zero or negative means none.
pub fn from_unix_nanos(nanos: i64) -> Option<SystemTime> {
    if nanos <= 0 {
        return None;
    }
    UNIX_EPOCH.checked_add(Duration::from_nanos(nanos as u64))
}

/// Serializes a mapping to snapshot JSON. Keys are written in sorted order.
pub fn encode(entries: &HashMap<String, Entry>) -> Result<Vec<u8>, SnapshotError> {
    let records: BTreeMap<&str, RecordRef<'_>> = entries
        .iter()
        .map(|(key, entry)| {
            (
                key.as_str(),
                RecordRef {
                    value: &entry.value,
                    expiration: to_unix_nanos(entry.expires_at),
                },
            )
        })
        .collect();

    serde_json::to_vec(&records).map_err(SnapshotError::Encode)
}

/// Parses snapshot JSON back into entries.
pub fn decode(bytes: &[u8]) -> Result<HashMap<String, Entry>, serde_json::Error> {
    let records: HashMap<String, SnapshotRecord> = serde_json::from_slice(bytes)?;

    Ok(records
        .into_iter()
        .map(|(key, record)| {
            let entry = Entry {
                value: record.value,
                expires_at: from_unix_nanos(record.expiration),
            };
            (key, entry)
        })
        .collect())
}

/// Summary of a successful save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveReport {
    /// Number of entries written, including expired-but-unswept ones
    pub entries: usize,
    /// Size of the file in bytes
    pub bytes: usize,
    /// Wall time of the whole save
    pub elapsed: Duration,
}

/// Snapshot counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotStats {
    /// Successful saves
    pub saves: u64,
    /// Failed saves
    pub save_failures: u64,
    /// Entries restored by the last load
    pub loaded_entries: u64,
}

/// Saves and loads one keyspace to and from one snapshot file.
#[derive(Debug)]
pub struct SnapshotManager {
    path: PathBuf,
    keyspace: Arc<Keyspace>,
    /// Held for the whole encode, write and rename of one save
    save_lock: Mutex<()>,
    saves: AtomicU64,
    save_failures: AtomicU64,
    loaded_entries: AtomicU64,
}

impl SnapshotManager {
    /// Creates a manager for `path`. Nothing is read or written yet.
    pub fn new(path: impl Into<PathBuf>, keyspace: Arc<Keyspace>) -> Self {
        Self {
            path: path.into(),
            keyspace,
            save_lock: Mutex::new(()),
            saves: AtomicU64::new(0),
            save_failures: AtomicU64::new(0),
            loaded_entries: AtomicU64::new(0),
        }
    }

    /// The snapshot file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the snapshot file into the keyspace.
    ///
    /// Returns the number of entries restored; `0` if the file doesn't exist.
    /// On error nothing is inserted.
    pub async fn load(&self) -> Result<usize, SnapshotError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No snapshot found, starting empty");
                return Ok(0);
            }
            Err(source) => {
                return Err(SnapshotError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let entries = decode(&bytes).map_err(|source| SnapshotError::Decode {
            path: self.path.clone(),
            source,
        })?;

        let restored = self.keyspace.restore(entries);
        self.loaded_entries.store(restored as u64, Ordering::Relaxed);

        info!(
            path = %self.path.display(),
            entries = restored,
            "Snapshot loaded"
        );

        Ok(restored)
    }

    /// Writes a point-in-time copy of the keyspace to the snapshot file.
    ///
    /// Concurrent calls wait for each other. The file on disk always holds the
    /// copy taken by whichever save finished last.
    pub async fn save(&self) -> Result<SaveReport, SnapshotError> {
        let _guard = self.save_lock.lock().await;
        let result = self.save_inner().await;

        match result {
            Ok(_) => self.saves.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.save_failures.fetch_add(1, Ordering::Relaxed),
        };

        result
    }

    async fn save_inner(&self) -> Result<SaveReport, SnapshotError> {
        let started = Instant::now();

        let (entries, payload) = self
            .keyspace
            .with_entries(|entries| encode(entries).map(|payload| (entries.len(), payload)))?;

        write_replacing(&self.path, &payload).await?;

        Ok(SaveReport {
            entries,
            bytes: payload.len(),
            elapsed: started.elapsed(),
        })
    }

    /// Saves and logs the outcome instead of returning it.
    async fn save_logged(&self, reason: &'static str) {
        match self.save().await {
            Ok(report) => debug!(
                reason,
                path = %self.path.display(),
                entries = report.entries,
                bytes = report.bytes,
                elapsed_us = report.elapsed.as_micros() as u64,
                "Snapshot saved"
            ),
            Err(e) => error!(reason, error = %e, "Snapshot save failed"),
        }
    }

    /// Returns snapshot counters.
    pub fn stats(&self) -> SnapshotStats {
        SnapshotStats {
            saves: self.saves.load(Ordering::Relaxed),
            save_failures: self.save_failures.load(Ordering::Relaxed),
            loaded_entries: self.loaded_entries.load(Ordering::Relaxed),
        }
    }
}

/// Writes `payload` to `<path>.tmp`, then renames it over `path`.
async fn write_replacing(path: &Path, payload: &[u8]) -> Result<(), SnapshotError> {
    let write_err = |source: io::Error| SnapshotError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp = tmp_path(path);
    if let Err(e) = tokio::fs::write(&tmp, payload).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(write_err(e));
    }

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(write_err(e));
    }

    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Spawns the persistence task.
///
/// With `interval` set, the task saves every `interval`. Either way it saves
/// once more when the shutdown signal arrives, then exits. The final save has
/// completed (or failed and been logged) by the time the task finishes.
///
/// # Panics
///
/// Panics if called outside of a Tokio runtime.
pub fn spawn_persistence(
    manager: Arc<SnapshotManager>,
    interval: Option<Duration>,
    shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    info!(
        path = %manager.path().display(),
        interval_ms = interval.map(|d| d.as_millis() as u64),
        "Snapshot persistence started"
    );

    tokio::spawn(persistence_loop(manager, interval, shutdown_rx))
}

async fn persistence_loop(
    manager: Arc<SnapshotManager>,
    interval: Option<Duration>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let tick = async {
            match interval {
                Some(period) => tokio::time::sleep(period).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = tick => manager.save_logged("periodic").await,
            result = shutdown_rx.changed() => {
                if result.is_err() {
                    warn!("Store dropped without an explicit stop");
                    break;
                }
            }
        }
    }

    manager.save_logged("shutdown").await;
    info!(path = %manager.path().display(), "Snapshot persistence stopped");
}
