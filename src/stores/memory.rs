//! In-process store backed by a concurrent hash map.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::error::{FloodgateError, Result};
use crate::ratelimit::Store;

#[derive(Debug, Clone, Copy)]
struct Window {
    counter: u64,
    expires_at: Instant,
}

impl Window {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// A [`Store`] holding windows in memory.
///
/// Limits are only shared by callers holding the same instance, so this is
/// suited to single-process deployments and tests. Expired windows are
/// dropped when next touched, or in bulk by [`MemoryStore::purge_expired`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    windows: DashMap<String, Window>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries held, including expired ones not yet dropped.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Drop every expired window. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, window| !window.is_expired(now));
        before.saturating_sub(self.windows.len())
    }

    /// Run `f` on the live window for `key`, holding the shard lock.
    fn with_live<T>(&self, key: &str, f: impl FnOnce(&mut Window) -> T) -> Result<T> {
        let now = Instant::now();
        match self.windows.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_expired(now) {
                    entry.remove();
                    Err(FloodgateError::NoSuchKey(key.to_string()))
                } else {
                    Ok(f(entry.get_mut()))
                }
            }
            Entry::Vacant(_) => Err(FloodgateError::NoSuchKey(key.to_string())),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn init_with_ttl(&self, key: &str, ttl_secs: i64) -> Result<()> {
        let ttl = Duration::from_secs(ttl_secs.max(0) as u64);
        self.windows.insert(
            key.to_string(),
            Window {
                counter: 0,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<u64> {
        self.with_live(key, |window| window.counter)
    }

    async fn increment(&self, key: &str) -> Result<u64> {
        self.with_live(key, |window| {
            window.counter += 1;
            window.counter
        })
    }

    async fn get_ttl(&self, key: &str) -> Result<i64> {
        let now = Instant::now();
        self.with_live(key, |window| {
            // Round up so a live window never reports zero seconds left.
            let remaining = window.expires_at.saturating_duration_since(now);
            let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
            i64::try_from(secs).unwrap_or(i64::MAX)
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.windows.remove(key);
        Ok(())
    }
}
