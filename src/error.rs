//! Error types for Floodgate.

use thiserror::Error;

/// Main error type for Floodgate operations.
#[derive(Error, Debug)]
pub enum FloodgateError {
    /// The backing store could not be reached or rejected the command
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The window for a key is absent or has expired
    #[error("No such key: {0}")]
    NoSuchKey(String),

    /// The process-default limiter was used before `set_store`
    #[error("No default rate limiter configured")]
    NoDefaultLimiter,

    /// `set_store` was called after the default limiter was installed
    #[error("Default rate limiter already configured")]
    DefaultAlreadySet,

    /// A named limit rule was requested but not configured
    #[error("Unknown limit rule: {0}")]
    UnknownRule(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FloodgateError {
    /// Whether this error means the window is absent rather than the store failing.
    pub fn is_no_such_key(&self) -> bool {
        matches!(self, FloodgateError::NoSuchKey(_))
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for FloodgateError {
    fn from(err: redis::RedisError) -> Self {
        FloodgateError::StoreUnavailable(err.to_string())
    }
}

/// Result type alias for Floodgate operations.
pub type Result<T> = std::result::Result<T, FloodgateError>;
