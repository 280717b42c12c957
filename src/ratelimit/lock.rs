//! Per-key window handle.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use super::store::Store;
use crate::error::Result;

/// Handle used to check and record events against one key's window.
///
/// A lock carries no counting state of its own: every call goes to the
/// shared store, so locks are cheap to create and discard. Checking with
/// [`Lock::is_allowed`] and recording with [`Lock::hit`] are separate store
/// calls, so concurrent callers racing past the check may overshoot the
/// allowance by the number of racing calls.
#[derive(Clone)]
pub struct Lock {
    /// Key as given by the caller
    key: String,
    /// Key as stored (with the limiter's prefix applied)
    store_key: String,
    /// Events permitted per window, 0 for unlimited
    allowed: u64,
    /// Window length in whole seconds used when the window was created
    window_secs: i64,
    store: Arc<dyn Store>,
}

impl std::fmt::Debug for Lock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lock")
            .field("key", &self.key)
            .field("store_key", &self.store_key)
            .field("allowed", &self.allowed)
            .field("window_secs", &self.window_secs)
            .finish()
    }
}

impl Lock {
    pub(crate) fn new(
        key: &str,
        store_key: String,
        allowed: u64,
        window_secs: i64,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            key: key.to_string(),
            store_key,
            allowed,
            window_secs,
            store,
        }
    }

    /// Returns `true` if one more event may happen in the current window.
    ///
    /// Always `true` when no limit is configured. If the store cannot be
    /// read the check fails open and returns `true`.
    pub async fn is_allowed(&self) -> bool {
        if self.allowed == 0 {
            return true;
        }

        let hits = match self.store.get(&self.store_key).await {
            Ok(hits) => hits,
            Err(e) if e.is_no_such_key() => {
                debug!(key = %self.key, "No live window, allowing event");
                return true;
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "Store read failed, allowing event");
                return true;
            }
        };

        trace!(key = %self.key, hits, allowed = self.allowed, "Checking window");

        if hits < self.allowed {
            true
        } else {
            debug!(key = %self.key, hits, allowed = self.allowed, "Rate limit exceeded");
            false
        }
    }

    /// Record one event. Store failures are returned to the caller.
    pub async fn hit(&self) -> Result<()> {
        match self.store.increment(&self.store_key).await {
            Ok(hits) => {
                trace!(key = %self.key, hits, "Recorded hit");
                Ok(())
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to record hit");
                Err(e)
            }
        }
    }

    /// Remaining lifetime of the current window.
    ///
    /// Returns zero when the window is absent, expired, or the store cannot
    /// report it.
    pub async fn get_ttl(&self) -> Result<Duration> {
        match self.store.get_ttl(&self.store_key).await {
            Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs as u64)),
            Ok(_) => Ok(Duration::ZERO),
            Err(e) => {
                trace!(key = %self.key, error = %e, "No TTL for key");
                Ok(Duration::ZERO)
            }
        }
    }

    /// Number of events recorded in the current window.
    pub async fn hits(&self) -> Result<u64> {
        self.store.get(&self.store_key).await
    }

    /// The key this lock guards.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Events permitted per window, 0 meaning unlimited.
    pub fn allowed(&self) -> u64 {
        self.allowed
    }

    /// Window length the lock was created with.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs.max(0) as u64)
    }
}
