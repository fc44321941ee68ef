//! # Routes
//!
//! Axum router configuration for the top-up API: the three lifecycle
//! endpoints plus a health check, behind CORS allow-listing, a per-IP rate
//! ceiling (webhook exempt) and the security headers the frontend expects.

use crate::handlers::{self, ErrorResponse};
use crate::rate_limit;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::warn;

/// Create the main application router
///
/// Routes:
/// - GET  /                          - Health/status payload
/// - POST /api/create-payment        - Create a top-up invoice
/// - GET  /api/payment-status/{id}   - Poll + reconcile an invoice
/// - POST /api/payment-webhook       - Processor IPN callback (raw body)
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(
            state
                .config
                .allowed_origins
                .iter()
                .filter_map(|o| o.parse::<HeaderValue>().ok()),
        ))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    // Browser-facing routes carry the rate ceiling; the webhook does not,
    // the processor owns its own retry cadence
    let api_routes = Router::new()
        .route("/create-payment", post(handlers::create_payment))
        .route("/payment-status/{payment_id}", get(handlers::payment_status))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit,
        ))
        .merge(Router::new().route("/payment-webhook", post(handlers::payment_webhook)));

    Router::new()
        .route("/", get(handlers::health))
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(state.clone(), enforce_origin))
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Reject browser requests from origins outside the allow-list.
///
/// Requests without an `Origin` header (curl, processor callbacks) pass
/// through; allow-listed origins get their CORS headers from the CorsLayer.
async fn enforce_origin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(origin) = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
    {
        if !state.config.allowed_origins.iter().any(|o| o == origin) {
            warn!("Blocked CORS request from: {}", origin);
            return (
                StatusCode::FORBIDDEN,
                Json(ErrorResponse::new(
                    format!("The origin '{}' is not allowed", origin),
                    403,
                )),
            )
                .into_response();
        }
    }

    next.run(request).await
}
