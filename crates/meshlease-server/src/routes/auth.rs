//! `/request-auth`: issue a nonce challenge for a public key.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Serialize;

use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/request-auth", post(request_auth))
}

#[derive(Serialize)]
struct RequestAuthResponse {
    pubkey: String,
    nonce: String,
}

async fn request_auth(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Json<RequestAuthResponse>, AppError> {
    let pubkey_header = headers
        .get("x-pubkey")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("INVALID_REQUEST", "missing X-Pubkey header".to_owned()))?;

    let pubkey = BASE64
        .decode(pubkey_header)
        .map_err(|_| AppError::BadRequest("INVALID_REQUEST", "X-Pubkey is not valid base64".to_owned()))?;

    let nonce_id = state.auth.request_auth(&pubkey).await?;

    Ok(Json(RequestAuthResponse { pubkey: pubkey_header.to_owned(), nonce: nonce_id.to_string() }))
}
