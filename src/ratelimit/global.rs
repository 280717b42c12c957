//! Process-wide default rate limiter.
//!
//! Convenience functions for code that does not want to pass a
//! [`RateLimiter`] around. The default limiter is installed once with
//! [`set_store`] and lives for the rest of the process; until then every
//! call fails with `NoDefaultLimiter`. Prefer holding a `RateLimiter`
//! directly where it can be injected.

use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;

use tracing::info;

use super::limiter::RateLimiter;
use super::lock::Lock;
use super::store::Store;
use crate::error::{FloodgateError, Result};

static DEFAULT: OnceLock<RateLimiter> = OnceLock::new();

/// Install the default rate limiter, calling `factory` once for its store.
///
/// Only the first successful call takes effect. A call made after the
/// default is installed returns `DefaultAlreadySet` without invoking its
/// factory; calls racing with the first one may each run their factory,
/// and all but one of them then return `DefaultAlreadySet`. A factory
/// error leaves the default unset.
pub async fn set_store<F, Fut, S>(factory: F) -> Result<()>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<S>>,
    S: Store + 'static,
{
    if DEFAULT.get().is_some() {
        return Err(FloodgateError::DefaultAlreadySet);
    }

    let limiter = RateLimiter::new(factory).await?;
    install(limiter)
}

/// Install an already built limiter as the default.
pub fn install(limiter: RateLimiter) -> Result<()> {
    DEFAULT
        .set(limiter)
        .map_err(|_| FloodgateError::DefaultAlreadySet)?;
    info!("Default rate limiter installed");
    Ok(())
}

/// The default rate limiter, if one has been installed.
pub fn default_limiter() -> Option<&'static RateLimiter> {
    DEFAULT.get()
}

/// [`RateLimiter::new_lock`] on the default rate limiter.
pub async fn new_lock(key: &str, allowed: u64, window: Duration) -> Result<Lock> {
    let limiter = DEFAULT.get().ok_or(FloodgateError::NoDefaultLimiter)?;
    limiter.new_lock(key, allowed, window).await
}

/// [`RateLimiter::remove_lock`] on the default rate limiter.
pub async fn remove_lock(key: &str) -> Result<()> {
    let limiter = DEFAULT.get().ok_or(FloodgateError::NoDefaultLimiter)?;
    limiter.remove_lock(key).await
}
