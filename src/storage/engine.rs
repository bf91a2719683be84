//! Thread-Safe Storage Engine with Expiry Support
//!
//! This module implements the key-value map behind every connection.
//!
//! ## Design Decisions
//!
//! 1. **One RwLock**: a single reader/writer lock covers all keys, so every
//!    `set`, `get` and `delete` is linearizable.
//! 2. **Lazy Expiry**: a read that finds an expired entry removes it before
//!    returning. The background sweeper in [`crate::storage::expiry`] handles
//!    keys nobody reads again.
//! 3. **Bounded sweeps**: keys written with a TTL are also queued. Active
//!    expiry walks that queue a small batch at a time, taking the write lock
//!    once per batch, so no sweep ever holds the lock for the whole map.
//! 4. **Monotonic clock**: expiry instants come from [`Instant`], so wall
//!    clock jumps cannot resurrect or kill a key.
//!
//! ```text
//! ┌───────────────────────────────────────┐
//! │            StorageEngine              │
//! │  RwLock<Keyspace { entries, ttl_queue }>│
//! └───────────────────────────────────────┘
//!        ▲                     ▲
//!  connection tasks      ExpirySweeper
//! ```

use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// A stored value with optional expiry time.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored payload
    pub value: Bytes,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl CacheEntry {
    /// Creates an entry. A zero TTL means the entry never expires.
    pub fn new(value: Bytes, ttl: Option<Duration>) -> Self {
        let expires_at = ttl
            .filter(|ttl| !ttl.is_zero())
            .map(|ttl| Instant::now() + ttl);
        Self { value, expires_at }
    }

    /// Whether an expiry applies to this entry.
    #[inline]
    pub fn has_ttl(&self) -> bool {
        self.expires_at.is_some()
    }

    /// Checks whether this entry has expired as of `now`.
    ///
    /// An entry is expired from its expiry instant onward.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    /// Checks if this entry has expired.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }
}

/// Keys checked per lock acquisition by [`StorageEngine::cleanup_expired`].
pub const DEFAULT_EXPIRE_BATCH: usize = 20;

/// Outcome of one [`StorageEngine::expire_batch`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpireBatch {
    /// TTL records looked at, live or stale
    pub examined: usize,
    /// Entries removed because their deadline had passed
    pub expired: usize,
}

impl ExpireBatch {
    /// Fraction of examined records that turned out to be expired.
    pub fn expired_ratio(&self) -> f64 {
        if self.examined == 0 {
            0.0
        } else {
            self.expired as f64 / self.examined as f64
        }
    }
}

#[derive(Debug, Default)]
struct Keyspace {
    entries: HashMap<Bytes, CacheEntry>,
    /// `(key, deadline)` for every write that carried a TTL. A record whose
    /// deadline no longer matches the entry (overwritten, deleted, lazily
    /// expired) is stale and dropped when the sweeper reaches it.
    ttl_queue: VecDeque<(Bytes, Instant)>,
}

/// The key-value store shared by every client connection.
///
/// Build it once, wrap it in an `Arc`, and hand clones of the `Arc` to each
/// connection task. All operations are thread-safe.
///
/// # Example
///
/// ```
/// use emberkv::storage::StorageEngine;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let engine = StorageEngine::new();
///
/// engine.set(Bytes::from("name"), Bytes::from("Ariz"), None);
/// assert_eq!(engine.get(&Bytes::from("name")), Some(Bytes::from("Ariz")));
///
/// engine.set(Bytes::from("session"), Bytes::from("abc123"), Some(Duration::from_secs(60)));
/// assert!(engine.exists(&Bytes::from("session")));
/// ```
#[derive(Debug, Default)]
pub struct StorageEngine {
    data: RwLock<Keyspace>,
}

impl StorageEngine {
    /// Creates an empty storage engine.
    pub fn new() -> Self {
        Self::default()
    }

    // A stale or missing queue record is harmless, so a panic while the lock
    // is held cannot leave the keyspace in a state reads would notice.
    fn read(&self) -> RwLockReadGuard<'_, Keyspace> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Keyspace> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `value` under `key`, replacing whatever was there.
    ///
    /// `None` or a zero `ttl` stores the value without expiry. Any previous
    /// expiry on the key is discarded along with the old value.
    pub fn set(&self, key: Bytes, value: Bytes, ttl: Option<Duration>) {
        let entry = CacheEntry::new(value, ttl);
        let mut space = self.write();
        if let Some(deadline) = entry.expires_at {
            space.ttl_queue.push_back((key.clone(), deadline));
        }
        space.entries.insert(key, entry);
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired. An expired
    /// entry is removed before this returns.
    pub fn get(&self, key: &Bytes) -> Option<Bytes> {
        {
            let space = self.read();
            match space.entries.get(key) {
                Some(entry) if !entry.is_expired() => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Expired under the read lock. Re-check under the write lock: another
        // writer may have stored a fresh value in between.
        let mut space = self.write();
        let now = Instant::now();
        match space.entries.get(key) {
            Some(entry) if !entry.is_expired_at(now) => return Some(entry.value.clone()),
            Some(_) => {}
            None => return None,
        }
        space.entries.remove(key);
        None
    }

    /// Deletes a key. Deleting a missing key is a no-op.
    ///
    /// Returns `true` if a live key was removed.
    pub fn delete(&self, key: &Bytes) -> bool {
        self.write()
            .entries
            .remove(key)
            .is_some_and(|entry| !entry.is_expired())
    }

    /// Checks if a key exists (and is not expired).
    pub fn exists(&self, key: &Bytes) -> bool {
        self.read()
            .entries
            .get(key)
            .is_some_and(|e| !e.is_expired())
    }

    /// Returns the number of stored entries, including expired ones that
    /// have not been cleaned up yet.
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    /// Returns true if the database is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of TTL records waiting to be checked by the sweeper,
    /// stale ones included.
    pub fn pending_ttl_records(&self) -> usize {
        self.read().ttl_queue.len()
    }

    /// Checks up to `limit` TTL records under a single write-lock hold.
    ///
    /// Expired entries are removed. Records for live entries go to the back
    /// of the queue; stale records are dropped. The lock is held for at most
    /// `limit` map lookups, whatever the size of the store.
    pub fn expire_batch(&self, limit: usize) -> ExpireBatch {
        let mut space = self.write();
        let now = Instant::now();
        let mut batch = ExpireBatch::default();

        let todo = limit.min(space.ttl_queue.len());
        for _ in 0..todo {
            let Some((key, deadline)) = space.ttl_queue.pop_front() else {
                break;
            };
            batch.examined += 1;

            match space.entries.get(&key).and_then(|entry| entry.expires_at) {
                Some(current) if current == deadline && current <= now => {
                    space.entries.remove(&key);
                    batch.expired += 1;
                }
                Some(current) if current == deadline => {
                    space.ttl_queue.push_back((key, deadline));
                }
                _ => {}
            }
        }

        batch
    }

    /// Checks every TTL record queued at the time of the call, in batches of
    /// [`DEFAULT_EXPIRE_BATCH`], releasing the lock between batches.
    ///
    /// # Returns
    ///
    /// Returns the number of keys that were cleaned up.
    pub fn cleanup_expired(&self) -> u64 {
        let mut remaining = self.pending_ttl_records();
        let mut expired = 0u64;

        while remaining > 0 {
            let batch = self.expire_batch(remaining.min(DEFAULT_EXPIRE_BATCH));
            if batch.examined == 0 {
                break;
            }
            remaining = remaining.saturating_sub(batch.examined);
            expired += batch.expired as u64;
        }

        expired
    }
}
