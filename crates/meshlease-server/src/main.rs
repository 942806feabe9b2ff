//! Lease server entry point.
//!
//! Bootstraps the Postgres store, Redis cache, and domain services, then
//! starts the Axum HTTP server with graceful shutdown. The nonce cleaner and
//! rate-limiter janitor run alongside the server as supervised background
//! tasks on a shared shutdown channel.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::HeaderValue;
use axum::middleware as axum_mw;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower::timeout::TimeoutLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use meshlease_cache::RedisCache;
use meshlease_core::{nonce_cleaner, AllocatorConfig, AllocatorService, AuthService, Repository};
use meshlease_storage::PgStore;

use meshlease_server::config::ServerConfig;
use meshlease_server::middleware::{auth_middleware, header_sanitization_middleware, rate_limit_middleware};
use meshlease_server::rate_limit::{self, RateLimiter};
use meshlease_server::routes;
use meshlease_server::state::AppState;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env().context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!(bind_addr = %config.bind_addr, "meshlease starting");

    let state = build_app_state(&config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let cleaner_handle = tokio::spawn(nonce_cleaner::run(Arc::clone(&state.repo), config.nonce_cleaner_interval, shutdown_rx.clone()));
    let janitor_handle = tokio::spawn(rate_limit::run_janitor(Arc::clone(&state.rate_limiter), config.nonce_cleaner_interval, shutdown_rx.clone()));

    let app = build_router(Arc::clone(&state));

    let listener = TcpListener::bind(config.bind_addr).await.with_context(|| format!("failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "meshlease listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .context("server error")?;

    info!("waiting for background workers to stop");
    let _ = tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, cleaner_handle).await;
    let _ = tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, janitor_handle).await;

    info!("meshlease stopped");
    Ok(())
}

async fn build_app_state(config: &ServerConfig) -> anyhow::Result<Arc<AppState>> {
    let pg_store = Arc::new(PgStore::connect(&config.database_url, config.postgres_pool_size).await.context("failed to open Postgres store")?);
    let redis_cache = Arc::new(RedisCache::connect(&config.redis_url, config.cache_enabled).await.context("failed to open Redis cache")?);

    let repo = Arc::new(Repository::new(pg_store.clone(), pg_store.clone(), redis_cache.clone(), redis_cache.clone()));

    let allocator = Arc::new(AllocatorService::new(
        Arc::clone(&repo),
        AllocatorConfig {
            max_retries: config.max_lease_retries,
            retry_delay: config.lease_retry_delay,
            lease_ttl_secs: config.lease_ttl_secs,
        },
    ));

    let auth = Arc::new(AuthService::new(Arc::clone(&repo), config.nonce_ttl_secs));

    let rate_limiter = Arc::new(RateLimiter::new(
        config.rate_limit_requests_per_minute,
        config.rate_limit_burst,
        &config.rate_limit_trusted_proxies,
    ));

    Ok(Arc::new(AppState {
        repo,
        allocator,
        auth,
        rate_limiter,
        config: Arc::new(config.clone()),
        pg_store,
        redis_cache,
    }))
}

fn build_router(state: Arc<AppState>) -> Router {
    let authenticated_routes = routes::leases::router().route_layer(axum_mw::from_fn_with_state(Arc::clone(&state), auth_middleware));

    Router::new()
        .merge(routes::sys::router())
        .merge(routes::auth::router())
        .merge(routes::leases::public_router())
        .merge(authenticated_routes)
        .layer(axum_mw::from_fn_with_state(Arc::clone(&state), rate_limit_middleware))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(axum_mw::from_fn(header_sanitization_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(tower_http::limit::RequestBodyLimitLayer::new(state.config.max_body_bytes))
        .layer(SetResponseHeaderLayer::overriding(axum::http::header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")))
        .layer(SetResponseHeaderLayer::overriding(axum::http::header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY")))
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::HeaderName::from_static("x-xss-protection"),
            HeaderValue::from_static("1; mode=block"),
        ))
        .layer(SetResponseHeaderLayer::overriding(axum::http::header::REFERRER_POLICY, HeaderValue::from_static("no-referrer")))
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'none'"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::HeaderName::from_static("permissions-policy"),
            HeaderValue::from_static("geolocation=(), microphone=(), camera=()"),
        ))
        .with_state(state)
}

/// Wait for SIGINT or SIGTERM, then broadcast shutdown.
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
    let _ = shutdown_tx.send(true);
}
