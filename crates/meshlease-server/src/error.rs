//! HTTP error types.
//!
//! Maps domain errors from `meshlease-core` into an error envelope clients
//! can rely on: every error variant produces a JSON body with a
//! machine-readable `type`/`code` pair and a human message. None of the
//! underlying store or cache identities ever reach a client — those collapse
//! to a generic `internal` error.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use meshlease_core::{AllocatorError, AuthError, CryptoError, TokenError};

/// Application-level error returned from HTTP handlers.
///
/// Every variant but `RateLimited` and `Internal` carries a stable
/// machine-readable `code` (e.g. `LEASE_NOT_FOUND`, `INVALID_SIGNATURE`)
/// alongside the human-readable message, so clients can branch on the
/// error's identity rather than its HTTP status alone.
#[derive(Debug)]
pub enum AppError {
    /// Client sent invalid or malformed input.
    BadRequest(&'static str, String),
    /// Authentication failed (missing/invalid signature, nonce problem).
    Unauthorized(&'static str, String),
    /// The public key presented does not match the one bound to the nonce.
    Forbidden(&'static str, String),
    /// Requested resource not found.
    NotFound(&'static str, String),
    /// A conflicting state (e.g. nonce already consumed).
    Conflict(&'static str, String),
    /// Too many requests from this source.
    RateLimited { retry_after_secs: u64 },
    /// Internal failure; detail is logged but never returned to the client.
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    r#type: &'static str,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, code, message, retry_after) = match self {
            Self::BadRequest(code, msg) => (StatusCode::BAD_REQUEST, "validation", code, msg, None),
            Self::Unauthorized(code, msg) => (StatusCode::UNAUTHORIZED, "auth", code, msg, None),
            Self::Forbidden(code, msg) => (StatusCode::FORBIDDEN, "auth", code, msg, None),
            Self::NotFound(code, msg) => (StatusCode::NOT_FOUND, "not_found", code, msg, None),
            Self::Conflict(code, msg) => (StatusCode::CONFLICT, "conflict", code, msg, None),
            Self::RateLimited { retry_after_secs } => {
                (StatusCode::TOO_MANY_REQUESTS, "rate_limit", "RATE_LIMIT_EXCEEDED", "rate limit exceeded".to_owned(), Some(retry_after_secs))
            }
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", "INTERNAL", "internal server error".to_owned(), None)
            }
        };

        let body = ErrorBody { r#type: kind, code, message };
        let mut response = (status, axum::Json(body)).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(axum::http::header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        let message = err.to_string();
        match err {
            AuthError::Crypto(CryptoError::InvalidPubkey { .. }) => Self::BadRequest("INVALID_PUBKEY", message),
            AuthError::Crypto(CryptoError::InvalidSignature) => Self::Unauthorized("INVALID_SIGNATURE", message),
            AuthError::NonceNotFound => Self::Unauthorized("NONCE_NOT_FOUND", message),
            AuthError::NonceExpired => Self::Unauthorized("NONCE_EXPIRED", message),
            AuthError::NonceConsumed => Self::Unauthorized("NONCE_CONSUMED", message),
            AuthError::PubkeyMismatch => Self::Forbidden("PUBKEY_MISMATCH", message),
            AuthError::StoreUnavailable(_) => Self::Internal(message),
        }
    }
}

impl From<AllocatorError> for AppError {
    fn from(err: AllocatorError) -> Self {
        match err {
            AllocatorError::StoreUnavailable(_) | AllocatorError::RetriesExhausted { .. } => Self::Internal(err.to_string()),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        Self::BadRequest("INVALID_TOKEN", err.to_string())
    }
}
