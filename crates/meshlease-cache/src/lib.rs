//! Redis-backed cache layer for leases and auth nonces.
//!
//! [`RedisCache`] is a thin wrapper over a cloned
//! [`redis::aio::ConnectionManager`][redis::aio::ConnectionManager]; cloning
//! is cheap and concurrency-safe, so every subsystem that needs cache access
//! holds its own copy rather than sharing one behind a lock.

pub mod error;
pub mod lease_cache;
pub mod nonce_cache;
pub mod outcome;

use redis::aio::ConnectionManager;

pub use error::CacheError;
pub use lease_cache::LeaseCache;
pub use nonce_cache::NonceCache;
pub use outcome::CacheOutcome;

/// Redis-backed implementation of [`LeaseCache`] and [`NonceCache`].
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    enabled: bool,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache").field("enabled", &self.enabled).finish_non_exhaustive()
    }
}

impl RedisCache {
    /// Open a connection manager against `redis_url`.
    ///
    /// When `enabled` is `false`, the manager is still opened (so a later
    /// config flip doesn't need a restart) but every cache method returns
    /// [`CacheError::Disabled`], forcing callers onto the store fallback
    /// path uniformly.
    pub async fn connect(redis_url: &str, enabled: bool) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url).map_err(|e| CacheError::Open { reason: e.to_string() })?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::Open { reason: e.to_string() })?;
        Ok(Self { conn, enabled })
    }

    /// Cheap liveness probe for the `/ready` endpoint.
    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| CacheError::Open { reason: e.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_cache_errors_are_distinguishable() {
        let err = CacheError::Disabled;
        assert!(matches!(err, CacheError::Disabled));
    }
}
