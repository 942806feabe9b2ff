//! Cache error types.

/// Errors that can occur while talking to the Redis cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to open the Redis connection manager.
    #[error("failed to open cache connection: {reason}")]
    Open { reason: String },

    /// A command against the lease keyspace failed.
    #[error("lease cache error during {op}: {reason}")]
    Lease { op: &'static str, reason: String },

    /// A command against the nonce keyspace failed.
    #[error("nonce cache error during {op}: {reason}")]
    Nonce { op: &'static str, reason: String },

    /// Serializing or deserializing a cached value failed.
    #[error("cache payload codec error during {op}: {reason}")]
    Codec { op: &'static str, reason: String },

    /// The cache is administratively disabled; every operation faults so
    /// the hybrid repository falls through to the durable store uniformly.
    #[error("cache disabled")]
    Disabled,
}
