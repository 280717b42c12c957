//! Store backends.
//!
//! Any type implementing [`Store`](crate::ratelimit::Store) can back a rate
//! limiter. These are the ones that ship with the crate.

mod memory;
#[cfg(feature = "redis")]
mod redis_store;

use std::sync::Arc;

use tracing::info;

use crate::config::StoreConfig;
use crate::error::Result;
use crate::ratelimit::Store;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;

/// Build the store described by `config`.
pub async fn open(config: &StoreConfig) -> Result<Arc<dyn Store>> {
    match config {
        StoreConfig::Memory => {
            info!("Using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
        #[cfg(feature = "redis")]
        StoreConfig::Redis { url } => {
            info!(url = %url, "Connecting to Redis store");
            Ok(Arc::new(RedisStore::connect(url).await?))
        }
        #[cfg(not(feature = "redis"))]
        StoreConfig::Redis { .. } => Err(crate::error::FloodgateError::Config(
            "Redis store requested but floodgate was built without the `redis` feature".into(),
        )),
    }
}
