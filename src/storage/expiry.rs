//! Background Expiry Sweeper
//!
//! This module implements a background task that periodically scans the
//! keyspace for expired entries and removes them. This is called "active
//! expiry" as opposed to "lazy expiry", which the read paths already apply.
//!
//! ## Why Do We Need This?
//!
//! Lazy expiry hides expired entries from readers, but it never frees them.
//! A key that is set with a TTL and never read again would stay in memory
//! forever. The sweeper bounds that growth.
//!
//! ## Design
//!
//! The sweeper runs as a Tokio task and:
//! 1. Sleeps for a fixed interval (default: 100ms)
//! 2. Wakes up and evicts every expired entry under the write lock
//! 3. Logs how many entries it evicted
//!
//! It exits as soon as the store's shutdown signal is asserted. There is no
//! final sweep: expired entries are already invisible to readers.

use crate::storage::Keyspace;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(100);

/// Spawns the expiry sweeper as a background task.
///
/// # Arguments
///
/// * `keyspace` - The keyspace to sweep
/// * `interval` - Time between two sweeps
/// * `shutdown_rx` - The store's shutdown signal; the task exits once it reads `true`
///   or once the sender is gone
///
/// # Panics
///
/// Panics if called outside of a Tokio runtime.
pub fn spawn_sweeper(
    keyspace: Arc<Keyspace>,
    interval: Duration,
    shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let handle = tokio::spawn(sweeper_loop(keyspace, interval, shutdown_rx));

    info!(interval_ms = interval.as_millis() as u64, "Background expiry sweeper started");

    handle
}

/// The main sweeper loop.
async fn sweeper_loop(
    keyspace: Arc<Keyspace>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    if *shutdown_rx.borrow() {
        return;
    }

    loop {
        // Wait for the interval or shutdown signal
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    info!("Background expiry sweeper stopped");
                    return;
                }
                continue;
            }
        }

        let expired = keyspace.cleanup_expired();

        if expired > 0 {
            debug!(expired = expired, "Expired keys cleaned up");
        } else {
            trace!("Sweep found nothing to evict");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sweeper_cleans_expired_keys() {
        let keyspace = Arc::new(Keyspace::new());

        // Add some keys with short TTL
        for i in 0..10 {
            keyspace.set_with_ttl(format!("key{}", i), "value", Duration::from_millis(50));
        }

        // Add a persistent key
        keyspace.set("persistent", "value");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let _sweeper = spawn_sweeper(Arc::clone(&keyspace), Duration::from_millis(10), shutdown_rx);

        // Wait for keys to expire and be cleaned up
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Only the persistent key should remain, physically as well
        assert_eq!(keyspace.with_entries(|entries| entries.len()), 1);
        assert_eq!(keyspace.get("persistent"), Some("value".to_string()));
        assert_eq!(keyspace.stats().expired, 10);

        shutdown_tx.send_replace(true);
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_signal() {
        let keyspace = Arc::new(Keyspace::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let sweeper = spawn_sweeper(Arc::clone(&keyspace), Duration::from_millis(10), shutdown_rx);
        tokio::time::sleep(Duration::from_millis(30)).await;

        shutdown_tx.send_replace(true);
        tokio::time::timeout(Duration::from_secs(1), sweeper)
            .await
            .expect("sweeper did not stop")
            .unwrap();

        // Add keys after sweeper is stopped
        keyspace.set_with_ttl("key", "value", Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Nobody evicted it, but reads still treat it as gone
        assert_eq!(keyspace.with_entries(|entries| entries.len()), 1);
        assert_eq!(keyspace.get("key"), None);
    }

    #[tokio::test]
    async fn test_sweeper_stops_when_sender_dropped() {
        let keyspace = Arc::new(Keyspace::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let sweeper = spawn_sweeper(keyspace, Duration::from_millis(10), shutdown_rx);
        drop(shutdown_tx);

        tokio::time::timeout(Duration::from_secs(1), sweeper)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_sweeper_does_not_start_after_shutdown() {
        let keyspace = Arc::new(Keyspace::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(true);

        let sweeper = spawn_sweeper(keyspace, Duration::from_millis(10), shutdown_rx);

        tokio::time::timeout(Duration::from_secs(1), sweeper)
            .await
            .expect("sweeper did not stop")
            .unwrap();
        drop(shutdown_tx);
    }
}
