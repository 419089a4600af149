//! The Store: lifecycle and public API
//!
//! A [`Store`] owns one [`Keyspace`], the expiry sweeper that keeps it small,
//! and optionally a [`SnapshotManager`] that persists it.
//!
//! ## Lifecycle
//!
//! ```text
//!   Store::new()                    sweeper starts
//!        │
//!        ▼
//!   .with_snapshot_file(..)         configuration only
//!   .with_save_interval(..)
//!        │
//!        ▼
//!   .initialize().await             load snapshot, start persistence task
//!        │
//!        ▼
//!   set / get / delete / keys       from any number of tasks or threads
//!        │
//!        ▼
//!   .shutdown().await               stop signal, final save, tasks joined
//! ```
//!
//! Both background tasks watch the same shutdown signal. The sweeper simply
//! exits; the persistence task writes one last snapshot first.

use crate::config::StoreConfig;
use crate::storage::{
    spawn_persistence, spawn_sweeper, Keyspace, SaveReport, SnapshotError, SnapshotManager,
    SnapshotStats, StorageStats,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Combined store statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub storage: StorageStats,
    /// All zero when persistence is disabled
    pub snapshots: SnapshotStats,
}

/// An in-memory key-value store with per-key TTL and optional snapshots.
///
/// The foreground operations never fail and never touch the disk. Persistence
/// problems are logged and counted in [`Store::stats`], nothing more.
///
/// # Panics
///
/// [`Store::new`] and [`Store::with_config`] spawn the expiry sweeper, so they
/// must be called from within a Tokio runtime.
///
/// # Example
///
/// ```no_run
/// use snapkv::Store;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let store = Store::new()
///         .with_snapshot_file("store.snapshot.json")
///         .with_save_interval(Duration::from_secs(5))
///         .initialize()
///         .await;
///
///     store.set("name", "Ariz");
///     store.set_with_ttl("session", "abc123", Duration::from_secs(60));
///     assert_eq!(store.get("name"), Some("Ariz".to_string()));
///
///     store.shutdown().await;
/// }
/// ```
pub struct Store {
    keyspace: Arc<Keyspace>,
    config: StoreConfig,
    snapshots: Option<Arc<SnapshotManager>>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    initialized: bool,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("keyspace", &self.keyspace)
            .field("config", &self.config)
            .field("initialized", &self.initialized)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Creates an empty store with default configuration and starts its sweeper.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Creates an empty store with `config` and starts its sweeper.
    ///
    /// Persistence, if configured, only starts with [`Store::initialize`].
    pub fn with_config(config: StoreConfig) -> Self {
        let keyspace = Arc::new(Keyspace::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let sweeper = spawn_sweeper(
            Arc::clone(&keyspace),
            config.effective_sweep_interval(),
            shutdown_rx,
        );

        Self {
            keyspace,
            config,
            snapshots: None,
            shutdown_tx,
            tasks: Mutex::new(vec![sweeper]),
            initialized: false,
        }
    }

    /// Sets the snapshot file. An empty path disables persistence.
    pub fn with_snapshot_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config = std::mem::take(&mut self.config).with_snapshot_file(path);
        self
    }

    /// Sets the interval between automatic saves.
    pub fn with_save_interval(mut self, interval: Duration) -> Self {
        self.config = std::mem::take(&mut self.config).with_save_interval(interval);
        self
    }

    /// Loads the configured snapshot and starts the persistence task.
    ///
    /// Loading is best effort: a missing, unreadable or malformed file leaves
    /// the store empty and is only logged. Without a snapshot file this does
    /// nothing. Calling it a second time does nothing either.
    pub async fn initialize(mut self) -> Self {
        if self.initialized {
            warn!("Store already initialized");
            return self;
        }
        self.initialized = true;

        let Some(path) = self.config.snapshot_path.clone() else {
            debug!("No snapshot file configured, persistence disabled");
            return self;
        };

        let manager = Arc::new(SnapshotManager::new(path, Arc::clone(&self.keyspace)));

        if let Err(e) = manager.load().await {
            warn!(error = %e, "Could not load snapshot, starting empty");
        }

        let persistence = spawn_persistence(
            Arc::clone(&manager),
            self.config.periodic_save_interval(),
            self.shutdown_tx.subscribe(),
        );

        self.tasks
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .push(persistence);
        self.snapshots = Some(manager);

        self
    }

    /// Sets a key to a value that never expires.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.keyspace.set(key, value);
    }

    /// Sets a key to a value that expires `ttl` from now.
    ///
    /// A zero `ttl` is the same as [`Store::set`]. Overwriting a key replaces
    /// both its value and its expiry.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: impl Into<String>, ttl: Duration) {
        self.keyspace.set_with_ttl(key, value, ttl);
    }

    /// Returns the value of a live key.
    pub fn get(&self, key: &str) -> Option<String> {
        self.keyspace.get(key)
    }

    /// Removes a key. Removing an absent key is a no-op.
    pub fn delete(&self, key: &str) {
        self.keyspace.delete(key);
    }

    /// Returns every live key, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        self.keyspace.keys()
    }

    /// Returns the remaining TTL of a live key; see [`Keyspace::ttl`].
    pub fn ttl(&self, key: &str) -> Option<Option<Duration>> {
        self.keyspace.ttl(key)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.keyspace.len()
    }

    /// True if there are no live keys.
    pub fn is_empty(&self) -> bool {
        self.keyspace.is_empty()
    }

    /// Evicts expired entries now instead of waiting for the sweeper.
    pub fn cleanup_expired(&self) -> u64 {
        self.keyspace.cleanup_expired()
    }

    /// Writes a snapshot now and reports the outcome.
    ///
    /// Returns [`SnapshotError::Disabled`] unless the store was initialized
    /// with a snapshot file.
    pub async fn save_snapshot(&self) -> Result<SaveReport, SnapshotError> {
        match &self.snapshots {
            Some(manager) => manager.save().await,
            None => Err(SnapshotError::Disabled),
        }
    }

    /// The configuration this store runs with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns store statistics.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            storage: self.keyspace.stats(),
            snapshots: self
                .snapshots
                .as_ref()
                .map(|manager| manager.stats())
                .unwrap_or_default(),
        }
    }

    /// True once the stop signal has been asserted.
    pub fn is_stopped(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Asserts the stop signal without waiting for the background tasks.
    ///
    /// The sweeper exits; the persistence task writes its final snapshot and
    /// exits. Calling this more than once is harmless. The in-memory operations
    /// keep working afterwards, but nothing is swept or saved any more.
    pub fn stop(&self) {
        if !self.shutdown_tx.send_replace(true) {
            info!("Store stopping");
        }
    }

    /// Asserts the stop signal and waits for both background tasks to finish,
    /// including the final snapshot save.
    pub async fn shutdown(&self) {
        self.stop();

        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Background task failed during shutdown");
            }
        }

        info!("Store shut down");
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        // Background tasks hold their own handle on the keyspace; make sure they end
        self.shutdown_tx.send_replace(true);
    }
}
