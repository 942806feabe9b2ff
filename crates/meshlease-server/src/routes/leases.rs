//! Lease routes: allocate, renew, release, and public lookups.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use meshlease_storage::{AllocationOutcome, Lease};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::middleware::AuthContext;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/allocate-ip", post(allocate_ip))
        .route("/renew-lease", post(renew_lease))
        .route("/release-lease", post(release_lease))
}

pub fn public_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/lease/peer-id/{peer_id}", get(get_by_peer))
        .route("/lease/token-id/{token_id}", get(get_by_token))
}

#[derive(Serialize)]
pub struct LeaseResponse {
    pub token_id: i64,
    pub peer_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub ttl: i64,
}

impl From<Lease> for LeaseResponse {
    fn from(lease: Lease) -> Self {
        let ttl = lease.ttl_secs();
        Self {
            token_id: lease.token_id,
            peer_id: lease.peer_id,
            created_at: lease.created_at,
            updated_at: lease.updated_at,
            expires_at: lease.expires_at,
            ttl,
        }
    }
}

#[derive(Deserialize)]
pub struct TokenIdQuery {
    #[serde(rename = "tokenID")]
    token_id: i64,
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
}

fn is_valid_peer_id(peer_id: &str) -> bool {
    !peer_id.is_empty()
        && peer_id.len() <= 128
        && peer_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

async fn allocate_ip(State(state): State<Arc<AppState>>, Extension(auth): Extension<AuthContext>) -> Result<Json<LeaseResponse>, AppError> {
    let lease = state.allocator.allocate(&auth.peer_id).await?;
    Ok(Json(lease.into()))
}

async fn renew_lease(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<TokenIdQuery>,
) -> Result<Json<LeaseResponse>, AppError> {
    if query.token_id <= 0 {
        return Err(AppError::BadRequest("INVALID_REQUEST", "tokenID must be a positive integer".to_owned()));
    }

    match state.repo.renew(query.token_id, &auth.peer_id, state.config.lease_ttl_secs).await {
        AllocationOutcome::Found(lease) => Ok(Json(lease.into())),
        AllocationOutcome::Empty => Err(AppError::NotFound("LEASE_NOT_FOUND", "no live lease for that peer at that token".to_owned())),
        AllocationOutcome::TransientFault(e) | AllocationOutcome::FatalFault(e) => Err(AppError::Internal(e.to_string())),
    }
}

async fn release_lease(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<TokenIdQuery>,
) -> Result<Json<StatusResponse>, AppError> {
    if query.token_id <= 0 {
        return Err(AppError::BadRequest("INVALID_REQUEST", "tokenID must be a positive integer".to_owned()));
    }

    match state.repo.release(query.token_id, &auth.peer_id).await {
        AllocationOutcome::Found(()) => Ok(Json(StatusResponse { status: "success" })),
        AllocationOutcome::Empty => Err(AppError::NotFound("LEASE_NOT_FOUND", "no live lease for that peer at that token".to_owned())),
        AllocationOutcome::TransientFault(e) | AllocationOutcome::FatalFault(e) => Err(AppError::Internal(e.to_string())),
    }
}

async fn get_by_peer(State(state): State<Arc<AppState>>, Path(peer_id): Path<String>) -> Result<Json<LeaseResponse>, AppError> {
    if !is_valid_peer_id(&peer_id) {
        return Err(AppError::BadRequest("INVALID_REQUEST", "peer_id contains characters outside [A-Za-z0-9_-]".to_owned()));
    }

    match state.repo.get_lease_by_peer(&peer_id).await {
        AllocationOutcome::Found(lease) => Ok(Json(lease.into())),
        AllocationOutcome::Empty => Err(AppError::NotFound("LEASE_NOT_FOUND", "no live lease for that peer".to_owned())),
        AllocationOutcome::TransientFault(e) | AllocationOutcome::FatalFault(e) => Err(AppError::Internal(e.to_string())),
    }
}

async fn get_by_token(State(state): State<Arc<AppState>>, Path(token_id): Path<i64>) -> Result<Json<LeaseResponse>, AppError> {
    if token_id <= 0 {
        return Err(AppError::BadRequest("INVALID_REQUEST", "token_id must be a positive integer".to_owned()));
    }

    match state.repo.get_lease_by_token(token_id).await {
        AllocationOutcome::Found(lease) => Ok(Json(lease.into())),
        AllocationOutcome::Empty => Err(AppError::NotFound("LEASE_NOT_FOUND", "no live lease at that token".to_owned())),
        AllocationOutcome::TransientFault(e) | AllocationOutcome::FatalFault(e) => Err(AppError::Internal(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_id_character_class_is_enforced() {
        assert!(is_valid_peer_id("abc123_-XYZ"));
        assert!(!is_valid_peer_id("has space"));
        assert!(!is_valid_peer_id("has/slash"));
        assert!(!is_valid_peer_id(""));
    }
}
