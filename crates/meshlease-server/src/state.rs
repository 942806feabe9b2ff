//! Shared application state for the lease server.
//!
//! A single [`AppState`] is constructed at startup and shared across all
//! Axum handlers via `Arc`.

use std::sync::Arc;

use meshlease_cache::RedisCache;
use meshlease_core::{AllocatorService, AuthService, Repository};
use meshlease_storage::PgStore;

use crate::config::ServerConfig;
use crate::rate_limit::RateLimiter;

/// Shared application state passed to all HTTP handlers.
pub struct AppState {
    pub repo: Arc<Repository>,
    pub allocator: Arc<AllocatorService>,
    pub auth: Arc<AuthService>,
    pub rate_limiter: Arc<RateLimiter>,
    pub config: Arc<ServerConfig>,
    /// Direct handle for the `/ready` probe; domain logic goes through
    /// [`Repository`] instead.
    pub pg_store: Arc<PgStore>,
    /// Direct handle for the `/ready` probe; domain logic goes through
    /// [`Repository`] instead.
    pub redis_cache: Arc<RedisCache>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
