//! Rate-limit middleware: applies the shared [`RateLimiter`] and annotates
//! every rate-limited-path response with `X-RateLimit-*` headers.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::AppError;
use crate::state::AppState;

pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    if !state.config.rate_limit_enabled {
        return next.run(req).await;
    }

    let ip = state.rate_limiter.source_ip(remote.ip(), req.headers());
    let decision = state.rate_limiter.allow(ip);

    if !decision.allowed {
        tracing::warn!(%ip, "rate limit exceeded");
        let mut response = AppError::RateLimited { retry_after_secs: decision.retry_after.as_secs().max(1) }.into_response();
        annotate(&mut response, decision.limit, decision.remaining, decision.reset_unix_secs);
        return response;
    }

    let mut response = next.run(req).await;
    annotate(&mut response, decision.limit, decision.remaining, decision.reset_unix_secs);
    response
}

fn annotate(response: &mut Response, limit: u32, remaining: u32, reset_unix_secs: u64) {
    let headers = response.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&limit.to_string()) {
        headers.insert("x-ratelimit-limit", v);
    }
    if let Ok(v) = HeaderValue::from_str(&remaining.to_string()) {
        headers.insert("x-ratelimit-remaining", v);
    }
    if let Ok(v) = HeaderValue::from_str(&reset_unix_secs.to_string()) {
        headers.insert("x-ratelimit-reset", v);
    }
}
