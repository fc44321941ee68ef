//! # Request Rate Ceiling
//!
//! Per-IP rate limiting for the API routes, keyed on the client address.
//! The webhook route bypasses this layer so processor retries are never
//! throttled.

use crate::handlers::ErrorResponse;
use crate::state::AppState;
use axum::{
    extract::{rejection::ExtensionRejection, ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use governor::{clock::DefaultClock, state::keyed::DefaultKeyedStateStore, Quota, RateLimiter};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
};
use tracing::warn;

pub type ApiRateLimiter = Arc<RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>>;

/// Build the keyed limiter for the configured per-minute ceiling
pub fn new_api_rate_limiter(per_minute: u32) -> ApiRateLimiter {
    let quota = NonZeroU32::new(per_minute.max(1)).unwrap();
    Arc::new(RateLimiter::keyed(Quota::per_minute(quota)))
}

/// Axum middleware enforcing the per-IP ceiling
pub async fn rate_limit(
    State(state): State<AppState>,
    connect_info: Result<ConnectInfo<SocketAddr>, ExtensionRejection>,
    request: Request,
    next: Next,
) -> Response {
    let ip = connect_info
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

    if state.rate_limiter.check_key(&ip).is_err() {
        warn!(%ip, "Rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorResponse::new("Too many requests", 429)),
        )
            .into_response();
    }

    next.run(request).await
}
