//! Floodgate - Fixed-Window Rate Limiting
//!
//! This crate counts events per key within fixed time windows and reports
//! whether another event is permitted. Counters live in a shared store with
//! per-key expiry, so every service instance pointed at the same store
//! enforces the same limits.
//!
//! ```no_run
//! use std::time::Duration;
//! use floodgate::ratelimit::RateLimiter;
//! use floodgate::stores::MemoryStore;
//!
//! # async fn example() -> floodgate::error::Result<()> {
//! let limiter = RateLimiter::with_store(MemoryStore::new());
//! let lock = limiter.new_lock("login:1.2.3.4", 5, Duration::from_secs(10)).await?;
//!
//! if lock.is_allowed().await {
//!     // attempt the login
//!     lock.hit().await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod stores;
