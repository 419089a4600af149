//! # snapkv - An In-Memory Key-Value Store with TTL and Snapshots
//!
//! snapkv keeps string keys and values in memory, lets any key expire after a
//! time-to-live, frees expired keys in the background, and can persist the
//! whole store to a JSON snapshot that is restored on the next start.
//!
//! ## Features
//!
//! - **Concurrent**: One `RwLock`; reads run in parallel, writes are exclusive
//! - **TTL Support**: Keys can have expiry times with automatic cleanup
//! - **Snapshots**: Periodic and on-shutdown saves, best-effort reload on start
//! - **Async background work**: The sweeper and the snapshot writer are Tokio tasks
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                Store                                    │
//! │                                                                         │
//! │   set / set_with_ttl / get / delete / keys                              │
//! │                     │                                                   │
//! │                     ▼                                                   │
//! │  ┌──────────────────────────────────────────────┐                       │
//! │  │                 Keyspace                     │                       │
//! │  │       RwLock<HashMap<String, Entry>>         │                       │
//! │  └──────────────────────────────────────────────┘                       │
//! │          ▲                               ▲                              │
//! │  ┌───────┴───────────┐        ┌──────────┴──────────┐   ┌────────────┐  │
//! │  │  spawn_sweeper    │        │  spawn_persistence  │──>│ JSON file  │  │
//! │  │ (Tokio task)      │        │  (SnapshotManager)  │   └────────────┘  │
//! │  └───────────────────┘        └─────────────────────┘                   │
//! │          ▲                               ▲                              │
//! │          └──────── shutdown signal ──────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use snapkv::Store;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(
//!         Store::new()
//!             .with_snapshot_file("store.snapshot.json")
//!             .with_save_interval(Duration::from_secs(5))
//!             .initialize()
//!             .await,
//!     );
//!
//!     store.set("name", "Ariz");
//!     store.set_with_ttl("session", "abc123", Duration::from_secs(60));
//!
//!     assert_eq!(store.get("name").as_deref(), Some("Ariz"));
//!     assert_eq!(store.keys().len(), 2);
//!
//!     // Stops the sweeper and writes one last snapshot
//!     store.shutdown().await;
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`store`]: The `Store` facade and its lifecycle
//! - [`storage`]: Keyspace, expiry sweeper and snapshots
//! - [`config`]: Store configuration, from code or environment
//!
//! ## Design Highlights
//!
//! ### Lazy + Active Expiry
//!
//! Keys with TTL are expired in two ways:
//! 1. **Lazy**: Every read checks expiry itself, so an expired key is gone for
//!    callers the moment its TTL passes
//! 2. **Active**: A background task periodically evicts expired keys
//!
//! This ensures memory is reclaimed even for keys that are never accessed again.
//!
//! ### Best-effort Durability
//!
//! Writes made after the last snapshot are lost on a crash. Snapshot failures
//! are logged and counted; they never surface through `set`/`get`/`delete`/`keys`.

pub mod config;
pub mod storage;
pub mod store;

// Re-export commonly used types for convenience
pub use config::{ConfigError, StoreConfig};
pub use storage::{Entry, Keyspace, SaveReport, SnapshotError, SnapshotStats, StorageStats};
pub use store::{Store, StoreStats};

/// Version of snapkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
