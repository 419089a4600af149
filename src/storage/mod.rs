//! Storage Module
//!
//! This module provides the storage building blocks behind [`Store`](crate::Store):
//! the keyspace itself, the background expiry sweeper, and JSON snapshots.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Keyspace                             │
//! │          RwLock<HashMap<String, Entry>> + stats             │
//! └─────────────────────────────────────────────────────────────┘
//!               ▲                               ▲
//!               │ write lock                    │ read lock
//!  ┌────────────┴────────────┐     ┌────────────┴────────────┐
//!  │     spawn_sweeper       │     │   spawn_persistence     │
//!  │  (Background Tokio Task)│     │   (SnapshotManager)     │
//!  └─────────────────────────┘     └─────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **RwLock**: Multiple concurrent readers, exclusive writers
//! - **TTL Support**: Keys can have time-to-live expiry
//! - **Lazy Expiry**: Expired keys are invisible to reads immediately
//! - **Active Expiry**: Background sweeper frees expired keys
//! - **Snapshots**: The keyspace can be written to and restored from a JSON file
//!
//! ## Example
//!
//! ```
//! use snapkv::storage::Keyspace;
//! use std::time::Duration;
//!
//! let keyspace = Keyspace::new();
//!
//! keyspace.set("name", "Ariz");
//! assert_eq!(keyspace.get("name"), Some("Ariz".to_string()));
//!
//! keyspace.set_with_ttl("session", "token123", Duration::from_secs(3600));
//! ```

pub mod engine;
pub mod expiry;
pub mod snapshot;

// Re-export commonly used types
pub use engine::{Entry, Keyspace, StorageStats};
pub use expiry::{spawn_sweeper, DEFAULT_SWEEP_INTERVAL};
pub use snapshot::{
    spawn_persistence, SaveReport, SnapshotError, SnapshotManager, SnapshotRecord, SnapshotStats,
};
