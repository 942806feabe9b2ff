//! Storage error types.
//!
//! Every variant carries enough context to diagnose the problem without a
//! debugger. None of these ever reach a client directly — the HTTP layer
//! maps them to a generic `internal` error so store identities never leak.

/// Errors that can occur while talking to the durable Postgres store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to open the pool or run startup migrations.
    #[error("failed to open storage at '{target}': {reason}")]
    Open { target: String, reason: String },

    /// A query against the `leases` table failed.
    #[error("lease store error during {op}: {reason}")]
    Lease { op: &'static str, reason: String },

    /// A query against the `nonces` table failed.
    #[error("nonce store error during {op}: {reason}")]
    Nonce { op: &'static str, reason: String },

    /// A query against the `alloc_state` table failed.
    #[error("allocation counter error during {op}: {reason}")]
    Alloc { op: &'static str, reason: String },

    /// The descending allocation counter reached its floor.
    #[error("allocation counter exhausted at {floor}")]
    CounterExhausted { floor: i64 },
}
