//! `/health` and `/ready` probes.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

const DEPENDENCY_PING_TIMEOUT: Duration = Duration::from_secs(2);

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health)).route("/ready", get(ready))
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
}

async fn health() -> Json<StatusResponse> {
    Json(StatusResponse { status: "ok" })
}

async fn ready(axum::extract::State(state): axum::extract::State<Arc<AppState>>) -> Result<Json<StatusResponse>, StatusCode> {
    let pg_ok = tokio::time::timeout(DEPENDENCY_PING_TIMEOUT, state.pg_store.ping()).await;
    let Ok(Ok(())) = pg_ok else {
        tracing::warn!("readiness probe: postgres ping failed or timed out");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    if state.config.cache_enabled {
        let redis_ok = tokio::time::timeout(DEPENDENCY_PING_TIMEOUT, state.redis_cache.ping()).await;
        let Ok(Ok(())) = redis_ok else {
            tracing::warn!("readiness probe: redis ping failed or timed out");
            return Err(StatusCode::SERVICE_UNAVAILABLE);
        };
    }

    Ok(Json(StatusResponse { status: "ready" }))
}
