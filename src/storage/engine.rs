//! Keyspace: the store core
//!
//! This module holds the key → [`Entry`] mapping behind a single reader/writer
//! lock, and implements the foreground operations on it.
//!
//! ## Design Decisions
//!
//! 1. **One lock**: Every operation goes through the same `RwLock`, so a write is
//!    never observed half-applied and `keys()` sees one consistent mapping.
//! 2. **Lazy Expiry**: Reads filter expired entries themselves. They never wait for
//!    the sweeper and never take the write lock.
//! 3. **One liveness rule**: `get`, `keys`, `len`, `ttl` and `cleanup_expired` all
//!    decide through [`Entry::is_live_at`].
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                  Keyspace                    │
//! │   ┌──────────────────────────────────────┐   │
//! │   │   RwLock<HashMap<String, Entry>>     │   │
//! │   └──────────────────────────────────────┘   │
//! │      ▲ read           ▲ write       ▲ read   │
//! │   get / keys     set / delete     snapshot   │
//! │   len / ttl      sweeper                     │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Expiration instants are wall-clock (`SystemTime`) rather than monotonic,
//! because they have to survive a snapshot and a process restart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime};

/// Represents a stored value with optional expiry time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The actual value stored
    pub value: String,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<SystemTime>,
}

impl Entry {
    /// Creates a new entry without expiry.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            expires_at: None,
        }
    }

    /// Creates a new entry that expires `ttl` from now.
    ///
    /// A zero TTL means the entry never expires. A TTL so large that the
    /// expiration instant cannot be represented is treated the same way.
    pub fn with_ttl(value: impl Into<String>, ttl: Duration) -> Self {
        let expires_at = if ttl.is_zero() {
            None
        } else {
            SystemTime::now().checked_add(ttl)
        };

        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// Returns true if this entry is still visible at `now`.
    ///
    /// An entry stops being live once `now` is strictly past its expiration.
    #[inline]
    pub fn is_live_at(&self, now: SystemTime) -> bool {
        self.expires_at.map_or(true, |exp| now <= exp)
    }

    /// Checks if this entry has expired.
    #[inline]
    pub fn is_expired(&self) -> bool {
        !self.is_live_at(SystemTime::now())
    }

    /// Returns the remaining lifetime at `now`, or None if the entry never expires.
    pub fn remaining_at(&self, now: SystemTime) -> Option<Duration> {
        self.expires_at
            .map(|exp| exp.duration_since(now).unwrap_or(Duration::ZERO))
    }
}

/// The key-value mapping shared by the foreground API and the background tasks.
///
/// # Thread Safety
///
/// This struct is designed to be wrapped in an `Arc` and shared between the
/// store facade, the expiry sweeper and the snapshot task. All operations are
/// thread-safe. A panic while a lock is held does not poison the keyspace for
/// everyone else; the next caller simply takes the guard.
///
/// # Example
///
/// ```
/// use snapkv::storage::Keyspace;
/// use std::time::Duration;
///
/// let keyspace = Keyspace::new();
///
/// keyspace.set("name", "Ariz");
/// assert_eq!(keyspace.get("name"), Some("Ariz".to_string()));
///
/// keyspace.set_with_ttl("session", "abc123", Duration::from_secs(60));
/// assert_eq!(keyspace.keys().len(), 2);
/// ```
pub struct Keyspace {
    entries: RwLock<HashMap<String, Entry>>,

    /// Statistics: total GET operations
    get_count: AtomicU64,

    /// Statistics: total SET operations
    set_count: AtomicU64,

    /// Statistics: total DEL operations
    del_count: AtomicU64,

    /// Statistics: number of expired entries evicted
    expired_count: AtomicU64,
}

impl std::fmt::Debug for Keyspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyspace")
            .field("entries", &self.len())
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Keyspace {
    /// Creates an empty keyspace.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    #[inline]
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Entry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Entry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets a key-value pair without expiry.
    ///
    /// If the key already exists, both its value and its expiry are replaced.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.insert(key.into(), Entry::new(value));
    }

    /// Sets a key-value pair with a TTL (Time-To-Live).
    ///
    /// A zero `ttl` behaves exactly like [`Keyspace::set`].
    pub fn set_with_ttl(&self, key: impl Into<String>, value: impl Into<String>, ttl: Duration) {
        self.insert(key.into(), Entry::with_ttl(value, ttl));
    }

    fn insert(&self, key: String, entry: Entry) {
        self.set_count.fetch_add(1, Ordering::Relaxed);
        self.write().insert(key, entry);
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired, whether or not
    /// the sweeper has removed it yet. Only takes the read lock.
    pub fn get(&self, key: &str) -> Option<String> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let now = SystemTime::now();
        self.read()
            .get(key)
            .filter(|entry| entry.is_live_at(now))
            .map(|entry| entry.value.clone())
    }

    /// Returns the remaining TTL of a live key.
    ///
    /// - `None` if the key doesn't exist or has expired
    /// - `Some(None)` if the key never expires
    /// - `Some(Some(remaining))` otherwise
    pub fn ttl(&self, key: &str) -> Option<Option<Duration>> {
        let now = SystemTime::now();
        self.read()
            .get(key)
            .filter(|entry| entry.is_live_at(now))
            .map(|entry| entry.remaining_at(now))
    }

    /// Deletes a key.
    ///
    /// Deleting an absent key is a no-op. Returns `true` if something was removed.
    pub fn delete(&self, key: &str) -> bool {
        self.del_count.fetch_add(1, Ordering::Relaxed);
        self.write().remove(key).is_some()
    }

    /// Returns every key that is live right now, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        let now = SystemTime::now();
        self.read()
            .iter()
            .filter(|(_, entry)| entry.is_live_at(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Returns the number of live keys.
    ///
    /// Entries that have expired but were not swept yet are not counted.
    pub fn len(&self) -> usize {
        let now = SystemTime::now();
        self.read()
            .values()
            .filter(|entry| entry.is_live_at(now))
            .count()
    }

    /// Returns true if there are no live keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every expired entry.
    ///
    /// This is called by the background expiry sweeper.
    ///
    /// # Returns
    ///
    /// Returns the number of entries that were evicted.
    pub fn cleanup_expired(&self) -> u64 {
        let now = SystemTime::now();
        let mut entries = self.write();
        let before = entries.len();

        entries.retain(|_, entry| entry.is_live_at(now));

        let removed = (before - entries.len()) as u64;
        drop(entries);

        if removed > 0 {
            self.expired_count.fetch_add(removed, Ordering::Relaxed);
        }

        removed
    }

    /// Runs `f` over the whole mapping while holding the read lock.
    ///
    /// The snapshot writer uses this to serialize a consistent point-in-time
    /// copy. Expired-but-unswept entries are included.
    pub(crate) fn with_entries<R>(&self, f: impl FnOnce(&HashMap<String, Entry>) -> R) -> R {
        f(&self.read())
    }

    /// Inserts previously persisted entries, overwriting keys that collide.
    ///
    /// Returns the number of entries inserted.
    pub(crate) fn restore(&self, loaded: HashMap<String, Entry>) -> usize {
        let count = loaded.len();
        self.write().extend(loaded);
        count
    }

    /// Returns keyspace statistics.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.len() as u64,
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }
}

/// Keyspace statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Number of live keys
    pub keys: u64,
    /// Total GET operations
    pub get_ops: u64,
    /// Total SET operations
    pub set_ops: u64,
    /// Total DEL operations
    pub del_ops: u64,
    /// Total expired entries evicted by sweeps
    pub expired: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_set_and_get() {
        let keyspace = Keyspace::new();

        keyspace.set("key", "value");
        assert_eq!(keyspace.get("key"), Some("value".to_string()));
    }

    #[test]
    fn test_get_nonexistent() {
        let keyspace = Keyspace::new();
        assert_eq!(keyspace.get("nonexistent"), None);
    }

    #[test]
    fn test_delete() {
        let keyspace = Keyspace::new();

        keyspace.set("key", "value");
        assert!(keyspace.delete("key"));
        assert_eq!(keyspace.get("key"), None);
        assert!(!keyspace.delete("key")); // Already deleted
        assert!(!keyspace.delete("never-existed"));
    }

    #[test]
    fn test_expiry_is_lazy() {
        let keyspace = Keyspace::new();

        keyspace.set_with_ttl("key", "value", Duration::from_millis(200));

        thread::sleep(Duration::from_millis(100));
        assert_eq!(keyspace.get("key"), Some("value".to_string()));

        thread::sleep(Duration::from_millis(200));
        assert_eq!(keyspace.get("key"), None);

        // Nothing swept it; the entry is still physically there
        assert_eq!(keyspace.with_entries(|entries| entries.len()), 1);
        assert!(keyspace.keys().is_empty());
        assert_eq!(keyspace.len(), 0);
    }

    #[test]
    fn test_debug_output_hides_expired_entries() {
        let keyspace = Keyspace::new();

        keyspace.set("kept", "v");
        keyspace.set_with_ttl("gone", "v", Duration::from_millis(1));
        thread::sleep(Duration::from_millis(20));

        // Still physically present, but not visible through any inspection path
        assert_eq!(keyspace.with_entries(|entries| entries.len()), 2);
        let debug = format!("{:?}", keyspace);
        assert!(debug.contains("entries: 1"), "{}", debug);
    }

    #[test]
    fn test_zero_ttl_never_expires() {
        let keyspace = Keyspace::new();

        keyspace.set_with_ttl("key", "value", Duration::ZERO);
        assert_eq!(keyspace.ttl("key"), Some(None));

        thread::sleep(Duration::from_millis(20));
        assert_eq!(keyspace.get("key"), Some("value".to_string()));
    }

    #[test]
    fn test_overwrite_replaces_value_and_expiry() {
        let keyspace = Keyspace::new();

        keyspace.set("key", "a");
        keyspace.set_with_ttl("key", "b", Duration::from_millis(50));
        assert_eq!(keyspace.get("key"), Some("b".to_string()));

        thread::sleep(Duration::from_millis(100));
        assert_eq!(keyspace.get("key"), None);

        // And the other way round: a plain set clears an earlier TTL
        keyspace.set_with_ttl("other", "a", Duration::from_millis(50));
        keyspace.set("other", "b");
        thread::sleep(Duration::from_millis(100));
        assert_eq!(keyspace.get("other"), Some("b".to_string()));
    }

    #[test]
    fn test_ttl() {
        let keyspace = Keyspace::new();

        assert_eq!(keyspace.ttl("nonexistent"), None);

        keyspace.set("persistent", "value");
        assert_eq!(keyspace.ttl("persistent"), Some(None));

        keyspace.set_with_ttl("expiring", "value", Duration::from_secs(100));
        let remaining = keyspace.ttl("expiring").flatten().unwrap();
        assert!(remaining > Duration::from_secs(99) && remaining <= Duration::from_secs(100));
    }

    #[test]
    fn test_keys_agree_with_get() {
        let keyspace = Keyspace::new();

        keyspace.set("forever", "1");
        keyspace.set_with_ttl("short", "2", Duration::from_millis(10));
        keyspace.set_with_ttl("long", "3", Duration::from_secs(60));
        keyspace.set("deleted", "4");
        keyspace.delete("deleted");

        thread::sleep(Duration::from_millis(50));

        let keys: HashSet<String> = keyspace.keys().into_iter().collect();
        let expected: HashSet<String> = ["forever", "long"].iter().map(|k| k.to_string()).collect();
        assert_eq!(keys, expected);

        for key in ["forever", "short", "long", "deleted"] {
            assert_eq!(keys.contains(key), keyspace.get(key).is_some(), "{}", key);
        }
    }

    #[test]
    fn test_cleanup_expired() {
        let keyspace = Keyspace::new();

        keyspace.set_with_ttl("key1", "value1", Duration::from_millis(10));
        keyspace.set_with_ttl("key2", "value2", Duration::from_millis(10));
        keyspace.set("key3", "value3"); // No expiry

        thread::sleep(Duration::from_millis(50));

        let cleaned = keyspace.cleanup_expired();
        assert_eq!(cleaned, 2);
        assert_eq!(keyspace.len(), 1);
        assert_eq!(keyspace.with_entries(|entries| entries.len()), 1);
        assert_eq!(keyspace.stats().expired, 2);

        assert_eq!(keyspace.cleanup_expired(), 0);
    }

    #[test]
    fn test_restore_keeps_expirations() {
        let keyspace = Keyspace::new();
        let past = SystemTime::now() - Duration::from_secs(5);

        let mut loaded = HashMap::new();
        loaded.insert("live".to_string(), Entry::new("1"));
        loaded.insert(
            "stale".to_string(),
            Entry {
                value: "2".to_string(),
                expires_at: Some(past),
            },
        );

        assert_eq!(keyspace.restore(loaded), 2);
        assert_eq!(keyspace.get("live"), Some("1".to_string()));
        assert_eq!(keyspace.get("stale"), None);
        assert_eq!(keyspace.keys(), vec!["live".to_string()]);
    }

    #[test]
    fn test_stats() {
        let keyspace = Keyspace::new();

        keyspace.set("a", "1");
        keyspace.set_with_ttl("b", "2", Duration::from_secs(10));
        keyspace.get("a");
        keyspace.get("missing");
        keyspace.delete("a");

        let stats = keyspace.stats();
        assert_eq!(stats.keys, 1);
        assert_eq!(stats.set_ops, 2);
        assert_eq!(stats.get_ops, 2);
        assert_eq!(stats.del_ops, 1);
        assert_eq!(stats.expired, 0);
    }

    #[test]
    fn test_concurrent_access() {
        let keyspace = Arc::new(Keyspace::new());
        let mut handles = vec![];

        // Spawn multiple writers
        for i in 0..10 {
            let keyspace = Arc::clone(&keyspace);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    let key = format!("key-{}-{}", i, j);
                    keyspace.set(key.clone(), "value");
                    keyspace.get(&key);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(keyspace.keys().len(), 1000);
        assert_eq!(keyspace.len(), 1000);
    }

    #[test]
    fn test_concurrent_mixed_workload() {
        let keyspace = Arc::new(Keyspace::new());
        let mut handles = vec![];

        for i in 0..8 {
            let keyspace = Arc::clone(&keyspace);
            handles.push(thread::spawn(move || {
                for j in 0..500 {
                    let key = format!("key-{}", j % 50);
                    match (i + j) % 4 {
                        0 => keyspace.set(key, "value"),
                        1 => keyspace.set_with_ttl(key, "value", Duration::from_millis(1)),
                        2 => {
                            keyspace.delete(&key);
                        }
                        _ => {
                            keyspace.get(&key);
                            keyspace.keys();
                        }
                    }
                }
            }));
        }

        let sweeper = {
            let keyspace = Arc::clone(&keyspace);
            thread::spawn(move || {
                for _ in 0..20 {
                    keyspace.cleanup_expired();
                    thread::sleep(Duration::from_millis(1));
                }
            })
        };

        for handle in handles {
            handle.join().unwrap();
        }
        sweeper.join().unwrap();

        assert!(keyspace.len() <= 50);
    }
}
