pub mod memory;

use std::time::Duration;

use thiserror::Error;

pub use memory::MemoryCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

/// Key-value cache with per-entry time-to-live.
///
/// Expiry is the backend's job: a key whose TTL has elapsed reads as absent.
/// Implementations are shared across request tasks for the process lifetime.
pub trait KvCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Stores `value` under `key`, replacing any previous value. A zero `ttl`
    /// removes the key instead.
    fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;
}
