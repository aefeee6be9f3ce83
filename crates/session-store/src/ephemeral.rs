//! Ephemeral key-value store with TTL
//!
//! The store owns the lifetime of everything it holds: refresh-token bindings
//! and login attempt counters disappear when their TTL elapses, without any
//! action from the caller. An expired entry is indistinguishable from one that
//! was never written.
//!
//! Atomicity is the store's job, not the caller's. `take` reads and removes in
//! one step, and `increment` bumps a counter in one step, so concurrent
//! requests can never both observe the same pre-update state.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::BoxFuture;
use crate::error::{Error, Result};

/// Contract for the ephemeral key-value store.
pub trait EphemeralStore: Send + Sync {
    /// Write `value` under `key`, replacing any previous value, expiring after `ttl`.
    fn set<'a>(&'a self, key: &'a str, value: &'a str, ttl: Duration)
    -> BoxFuture<'a, Result<()>>;

    /// Read the live value under `key`.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>>>;

    /// Atomically read and remove the live value under `key`.
    ///
    /// When several callers race on one key, at most one receives `Some`.
    fn take<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>>>;

    /// Remove `key`. Returns whether a live value was present.
    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool>>;

    /// Atomically increment the counter under `key` and return the new count.
    ///
    /// A missing or expired counter starts at 1 and expires after `ttl`.
    /// Increments of a live counter keep its original expiry.
    fn increment<'a>(&'a self, key: &'a str, ttl: Duration) -> BoxFuture<'a, Result<u64>>;
}

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-process `EphemeralStore` backed by a mutex-guarded map.
///
/// Expired entries are dropped lazily when touched, and eagerly by
/// `purge_expired` (see `spawn_sweep_task`).
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let entries = self.entries.lock().await;
        let now = Instant::now();
        entries.values().filter(|entry| entry.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
impl MemoryStore {
    /// Raw keys, expired ones included, sorted.
    pub(crate) async fn entries_for_test(&self) -> Vec<String> {
        let entries = self.entries.lock().await;
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl EphemeralStore for MemoryStore {
    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let expires_at = expiry(key, Instant::now(), ttl)?;
            let mut entries = self.entries.lock().await;
            entries.insert(
                key.to_owned(),
                Entry {
                    value: value.to_owned(),
                    expires_at,
                },
            );
            Ok(())
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            let now = Instant::now();
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
                Some(_) => {
                    entries.remove(key);
                    Ok(None)
                }
                None => Ok(None),
            }
        })
    }

    fn take<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            let now = Instant::now();
            Ok(entries
                .remove(key)
                .filter(|entry| entry.is_live(now))
                .map(|entry| entry.value))
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            let now = Instant::now();
            Ok(entries
                .remove(key)
                .is_some_and(|entry| entry.is_live(now)))
        })
    }

    fn increment<'a>(&'a self, key: &'a str, ttl: Duration) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            let now = Instant::now();

            if let Some(entry) = entries.get_mut(key).filter(|entry| entry.is_live(now)) {
                let count: u64 = entry
                    .value
                    .parse()
                    .map_err(|_| Error::WrongType(key.to_owned()))?;
                let count = count + 1;
                entry.value = count.to_string();
                return Ok(count);
            }

            let expires_at = expiry(key, now, ttl)?;
            debug!(key, ttl_secs = ttl.as_secs(), "starting counter window");
            entries.insert(
                key.to_owned(),
                Entry {
                    value: "1".to_owned(),
                    expires_at,
                },
            );
            Ok(1)
        })
    }
}

fn expiry(key: &str, now: Instant, ttl: Duration) -> Result<Instant> {
    now.checked_add(ttl).ok_or_else(|| Error::TtlOutOfRange {
        key: key.to_owned(),
        ttl_secs: ttl.as_secs(),
    })
}
