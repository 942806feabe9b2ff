//! Signed-request auth middleware for `/allocate-ip`, `/renew-lease`, and
//! `/release-lease`.
//!
//! Extracts `X-Pubkey` / `X-Nonce` / `X-Signature`, length-caps and decodes
//! them, and delegates verification to [`meshlease_core::AuthService`]. On
//! success the derived peer ID is attached to the request extensions for
//! handlers to read.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use uuid::Uuid;

use meshlease_core::crypto;

use crate::error::AppError;
use crate::state::AppState;

const PUBKEY_MIN_LEN: usize = 16;
const PUBKEY_MAX_LEN: usize = 2048;
const SIGNATURE_MIN_DECODED_LEN: usize = 32;

/// Peer identity attached to the request once auth succeeds.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub peer_id: String,
}

pub async fn auth_middleware(State(state): State<Arc<AppState>>, mut req: Request, next: Next) -> Response {
    match authenticate(&state, &req).await {
        Ok(ctx) => {
            req.extensions_mut().insert(ctx);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}

async fn authenticate(state: &AppState, req: &Request) -> Result<AuthContext, AppError> {
    let pubkey_header =
        header_str(req, "x-pubkey").ok_or_else(|| AppError::Unauthorized("MISSING_CREDENTIALS", "missing X-Pubkey header".to_owned()))?;
    let nonce_header =
        header_str(req, "x-nonce").ok_or_else(|| AppError::Unauthorized("MISSING_CREDENTIALS", "missing X-Nonce header".to_owned()))?;
    let signature_header =
        header_str(req, "x-signature").ok_or_else(|| AppError::Unauthorized("MISSING_CREDENTIALS", "missing X-Signature header".to_owned()))?;

    if !(PUBKEY_MIN_LEN..=PUBKEY_MAX_LEN).contains(&pubkey_header.len()) {
        return Err(AppError::BadRequest("INVALID_REQUEST", "X-Pubkey length out of bounds".to_owned()));
    }

    let pubkey = BASE64
        .decode(pubkey_header)
        .map_err(|_| AppError::BadRequest("INVALID_REQUEST", "X-Pubkey is not valid base64".to_owned()))?;
    let signature = BASE64
        .decode(signature_header)
        .map_err(|_| AppError::BadRequest("INVALID_REQUEST", "X-Signature is not valid base64".to_owned()))?;
    if signature.len() < SIGNATURE_MIN_DECODED_LEN {
        return Err(AppError::BadRequest("INVALID_REQUEST", "X-Signature is shorter than the minimum length".to_owned()));
    }

    let nonce_id =
        Uuid::parse_str(nonce_header).map_err(|_| AppError::BadRequest("INVALID_REQUEST", "X-Nonce is not a valid UUID".to_owned()))?;

    let verified_pubkey = state.auth.verify_auth(&pubkey, nonce_id, &signature).await?;
    if verified_pubkey != pubkey.as_slice() {
        return Err(AppError::Forbidden("PUBKEY_MISMATCH", "verified public key does not match the supplied key".to_owned()));
    }

    let peer_id = crypto::peer_id(&pubkey).map_err(|e| AppError::BadRequest("INVALID_PUBKEY", e.to_string()))?;
    Ok(AuthContext { peer_id })
}

fn header_str<'a>(req: &'a Request, name: &str) -> Option<&'a str> {
    req.headers().get(name)?.to_str().ok()
}
