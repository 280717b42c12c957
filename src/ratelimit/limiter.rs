//! Rate limiter that issues window locks over a shared store.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace};

use super::lock::Lock;
use super::store::Store;
use crate::config::{FloodgateConfig, LimitRule};
use crate::error::{FloodgateError, Result};
use crate::stores;

/// Issues [`Lock`]s for keys, all backed by one store.
///
/// The limiter itself holds no counters; cloning it is cheap and every clone
/// shares the same store handle.
#[derive(Clone)]
pub struct RateLimiter {
    /// Shared store handle, created once per limiter
    store: Arc<dyn Store>,
    /// Prepended to every key before it reaches the store
    prefix: String,
    /// Named limits available through `new_lock_for_rule`
    rules: HashMap<String, LimitRule>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("prefix", &self.prefix)
            .field("rules", &self.rules)
            .finish()
    }
}

impl RateLimiter {
    /// Create a rate limiter, calling `factory` once to obtain its store.
    pub async fn new<F, Fut, S>(factory: F) -> Result<Self>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<S>>,
        S: Store + 'static,
    {
        let store = factory().await?;
        info!("Rate limiter store initialized");
        Ok(Self::with_store(store))
    }

    /// Create a rate limiter over an existing store handle.
    pub fn with_store<S: Store + 'static>(store: S) -> Self {
        Self {
            store: Arc::new(store),
            prefix: String::new(),
            rules: HashMap::new(),
        }
    }

    /// Create a rate limiter from configuration: store backend, key prefix
    /// and named limits.
    pub async fn from_config(config: &FloodgateConfig) -> Result<Self> {
        let store = stores::open(&config.store).await?;
        let mut limiter = Self::with_store(store).with_rules(config.limits.clone());
        if let Some(prefix) = &config.key_prefix {
            limiter = limiter.with_prefix(prefix);
        }
        Ok(limiter)
    }

    /// Namespace every key under `prefix`.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Replace the set of named limits.
    pub fn with_rules(mut self, rules: HashMap<String, LimitRule>) -> Self {
        self.rules = rules;
        self
    }

    /// Get a lock for `key` allowing `allowed` events per `window`.
    ///
    /// If the key has no live window one is started with a counter of zero.
    /// An existing window keeps its counter until its TTL elapses, no matter
    /// how many locks are created for it in the meantime.
    ///
    /// The TTL read and the window start are separate store calls. Callers
    /// racing to open the first window for a key may each see it absent, and
    /// a late start resets the counter, discarding hits recorded by the
    /// others. Hits are only guaranteed to accumulate once the window exists.
    pub async fn new_lock(&self, key: &str, allowed: u64, window: Duration) -> Result<Lock> {
        let secs = window_secs(window);
        let store_key = self.store_key(key);

        let lock = Lock::new(key, store_key.clone(), allowed, secs, self.store.clone());

        match self.store.get_ttl(&store_key).await {
            Ok(remaining) if remaining >= 0 => {
                trace!(key = %key, remaining, "Reusing live window");
            }
            _ => {
                // Either there is no window or it has expired.
                debug!(key = %key, window_secs = secs, allowed, "Starting new window");
                self.store.init_with_ttl(&store_key, secs).await?;
            }
        }

        Ok(lock)
    }

    /// Get a lock for `key` using the named limit rule.
    pub async fn new_lock_for_rule(&self, rule: &str, key: &str) -> Result<Lock> {
        let limit = self
            .rules
            .get(rule)
            .ok_or_else(|| FloodgateError::UnknownRule(rule.to_string()))?;
        self.new_lock(key, limit.allowed, limit.window()).await
    }

    /// Drop the window for `key`, resetting its counter before the TTL would.
    pub async fn remove_lock(&self, key: &str) -> Result<()> {
        debug!(key = %key, "Removing window");
        self.store.delete(&self.store_key(key)).await
    }

    /// The store shared by every lock this limiter issues.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Named limit rules known to this limiter.
    pub fn rules(&self) -> &HashMap<String, LimitRule> {
        &self.rules
    }

    fn store_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}", self.prefix, key)
        }
    }
}

/// Whole seconds in `window`, rounded up, never less than one.
fn window_secs(window: Duration) -> i64 {
    let secs = window.as_secs() + u64::from(window.subsec_nanos() > 0);
    i64::try_from(secs.max(1)).unwrap_or(i64::MAX)
}
