//! Fixed-window rate limiting over a shared store.

mod global;
mod limiter;
mod lock;
mod store;

pub use global::{default_limiter, install, new_lock, remove_lock, set_store};
pub use limiter::RateLimiter;
pub use lock::Lock;
pub use store::Store;
