//! Store capability the rate limiter is built on.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// Key/value storage with per-key time-to-live.
///
/// All counting state lives behind this trait, so every service instance
/// pointed at the same backend enforces the same limits. Implementations
/// must be safe to share across tasks; if the underlying connection is not,
/// the implementation serializes access to it.
///
/// `increment` must be atomic with respect to concurrent callers on the same
/// key. Everything else in the limiter depends on it.
#[async_trait]
pub trait Store: Send + Sync {
    /// Create or overwrite the entry for `key` with a counter of zero that
    /// expires after `ttl_secs` seconds.
    async fn init_with_ttl(&self, key: &str, ttl_secs: i64) -> Result<()>;

    /// Current counter value. Fails with `NoSuchKey` if absent or expired.
    async fn get(&self, key: &str) -> Result<u64>;

    /// Atomically add one to the counter and return the new value.
    /// Fails with `NoSuchKey` if absent or expired.
    async fn increment(&self, key: &str) -> Result<u64>;

    /// Seconds until the entry expires. A negative value or `NoSuchKey`
    /// means the entry is absent.
    async fn get_ttl(&self, key: &str) -> Result<i64>;

    /// Remove the entry. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

#[async_trait]
impl<S: Store + ?Sized> Store for Arc<S> {
    async fn init_with_ttl(&self, key: &str, ttl_secs: i64) -> Result<()> {
        (**self).init_with_ttl(key, ttl_secs).await
    }

    async fn get(&self, key: &str) -> Result<u64> {
        (**self).get(key).await
    }

    async fn increment(&self, key: &str) -> Result<u64> {
        (**self).increment(key).await
    }

    async fn get_ttl(&self, key: &str) -> Result<i64> {
        (**self).get_ttl(key).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key).await
    }
}

#[async_trait]
impl<S: Store + ?Sized> Store for Box<S> {
    async fn init_with_ttl(&self, key: &str, ttl_secs: i64) -> Result<()> {
        (**self).init_with_ttl(key, ttl_secs).await
    }

    async fn get(&self, key: &str) -> Result<u64> {
        (**self).get(key).await
    }

    async fn increment(&self, key: &str) -> Result<u64> {
        (**self).increment(key).await
    }

    async fn get_ttl(&self, key: &str) -> Result<i64> {
        (**self).get_ttl(key).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key).await
    }
}
