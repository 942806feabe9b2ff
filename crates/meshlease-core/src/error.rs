//! Domain error types for the token codec, signature verifier, hybrid
//! repository, allocator, and auth state machine.

use meshlease_storage::StorageError;

/// Errors from [`crate::token`].
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("'{ip}' is not a dotted-quad IPv4 address")]
    NotIpv4 { ip: String },
    #[error("'{ip}' is outside 10.0.0.0/8")]
    OutOfRange { ip: String },
    #[error("host octet {host} is not allocatable (must be 1-254)")]
    InvalidHost { host: u8 },
    #[error("token {token} does not decode to a valid 10.0.0.0/8 address")]
    InvalidToken { token: i64 },
}

/// Errors from [`crate::crypto`].
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("malformed public key: {reason}")]
    InvalidPubkey { reason: String },
    #[error("signature does not verify against the supplied public key")]
    InvalidSignature,
}

/// Errors from the lease allocator service.
#[derive(Debug, thiserror::Error)]
pub enum AllocatorError {
    #[error("durable store unavailable: {0}")]
    StoreUnavailable(#[from] StorageError),
    #[error("allocation retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

/// Errors from the auth state machine.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("no such nonce")]
    NonceNotFound,
    #[error("nonce expired")]
    NonceExpired,
    #[error("nonce already consumed")]
    NonceConsumed,
    #[error("public key presented does not match the key that requested this nonce")]
    PubkeyMismatch,
    #[error("durable store unavailable: {0}")]
    StoreUnavailable(#[from] StorageError),
}
