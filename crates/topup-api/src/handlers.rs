//! # Request Handlers
//!
//! Axum request handlers for the top-up API. The handlers are a thin shell:
//! they parse and validate the transport payloads, delegate to the lifecycle
//! manager, and translate error kinds to HTTP status codes.

use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use topup_core::{InitiateTopUp, TopUpError, TopUpStatus};
use tracing::{error, info, instrument, warn};
use topup_nowpayments::{parse_ipn, verify_ipn_signature, IPN_SIGNATURE_HEADER};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Create payment request
#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    /// Top-up amount in USD
    #[serde(default)]
    pub amount: Option<f64>,
    /// Contact email
    #[serde(default)]
    pub email: Option<String>,
    /// Owning user id
    #[serde(default)]
    pub uid: Option<String>,
}

/// Create payment response
#[derive(Debug, Serialize)]
pub struct CreatePaymentResponse {
    /// Hosted checkout page (redirect the user here)
    pub invoice_url: String,
    /// Processor invoice id, used to poll status later
    pub payment_id: String,
    /// Initial invoice status
    pub status: TopUpStatus,
}

/// Payment status response
#[derive(Debug, Serialize)]
pub struct PaymentStatusResponse {
    pub status: TopUpStatus,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: u16) -> Self {
        Self {
            error: error.into(),
            code,
        }
    }
}

fn topup_error_to_response(err: TopUpError) -> (StatusCode, Json<ErrorResponse>) {
    let code = err.status_code();
    let response = ErrorResponse::new(err.to_string(), code);
    (
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(response),
    )
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "API Running",
        "service": "topup-rs",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Create a top-up invoice
#[instrument(skip(state, request))]
pub async fn create_payment(
    State(state): State<AppState>,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<Json<CreatePaymentResponse>, (StatusCode, Json<ErrorResponse>)> {
    let (amount, email, uid) = match (request.amount, request.email, request.uid) {
        (Some(amount), Some(email), Some(uid)) => (amount, email, uid),
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("Missing required fields", 400)),
            ))
        }
    };

    let initiated = state
        .manager
        .initiate(InitiateTopUp { amount, email, uid })
        .await
        .map_err(|e| {
            error!("Payment creation error: {}", e);
            topup_error_to_response(e)
        })?;

    Ok(Json(CreatePaymentResponse {
        invoice_url: initiated.invoice_url,
        payment_id: initiated.invoice_id,
        status: initiated.status,
    }))
}

/// Poll a payment's status with the processor and reconcile the stored record
#[instrument(skip(state), fields(payment_id = %payment_id))]
pub async fn payment_status(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
) -> Result<Json<PaymentStatusResponse>, (StatusCode, Json<ErrorResponse>)> {
    let change = state
        .manager
        .reconcile(&payment_id, None)
        .await
        .map_err(|e| {
            error!("Status check error: {}", e);
            topup_error_to_response(e)
        })?;

    Ok(Json(PaymentStatusResponse {
        status: change.current,
    }))
}

/// Handle the processor's IPN webhook.
///
/// The body is consumed raw so the signature covers the exact payload. An
/// unknown invoice id is acknowledged with 200 (the processor would retry a
/// non-2xx forever) but logged as an anomaly; internal failures return 500
/// so the processor's retry is the recovery path.
#[instrument(skip(state, headers, body))]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    if let Some(secret) = &state.ipn_secret {
        let signature = headers
            .get(IPN_SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse::new("Missing x-nowpayments-sig header", 400)),
                )
            })?;

        verify_ipn_signature(&body, signature, secret).map_err(|e| {
            error!("IPN verification failed: {}", e);
            topup_error_to_response(e)
        })?;
    }

    let event = parse_ipn(&body).map_err(|e| {
        error!("IPN parse error: {}", e);
        topup_error_to_response(e)
    })?;

    info!(
        invoice_id = %event.invoice_id,
        status = %event.status,
        "Received IPN webhook"
    );

    match state
        .manager
        .reconcile(&event.invoice_id, Some(event.status))
        .await
    {
        Ok(_) => Ok(StatusCode::OK),
        Err(TopUpError::TopUpNotFound { invoice_id }) => {
            // Acknowledge so the processor stops retrying, but flag it
            warn!(%invoice_id, "IPN for unknown invoice, acknowledged as no-op");
            Ok(StatusCode::OK)
        }
        Err(e) => {
            error!("Webhook processing failed: {}", e);
            Err(topup_error_to_response(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response() {
        let err = ErrorResponse::new("Test error", 400);
        assert_eq!(err.error, "Test error");
        assert_eq!(err.code, 400);
    }

    #[test]
    fn test_topup_error_conversion() {
        let err = TopUpError::Validation("Bad data".to_string());
        let (status, _json) = topup_error_to_response(err);
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let err = TopUpError::TopUpNotFound {
            invoice_id: "x".into(),
        };
        let (status, _json) = topup_error_to_response(err);
        assert_eq!(status, StatusCode::NOT_FOUND);

        let err = TopUpError::GatewayUnavailable("timeout".into());
        let (status, _json) = topup_error_to_response(err);
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
