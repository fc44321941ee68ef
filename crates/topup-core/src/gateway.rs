//! # Payment Gateway Trait
//!
//! Seam between the lifecycle manager and the external payment processor.
//! The production implementation lives in `topup-nowpayments`; tests inject
//! doubles.

use crate::error::TopUpResult;
use crate::topup::TopUpStatus;
use async_trait::async_trait;
use std::sync::Arc;

/// Invoice-creation request sent to the processor.
///
/// Amounts are USD cents; the processor receives a decimal price and chooses
/// the stablecoin payment rails.
#[derive(Debug, Clone)]
pub struct InvoiceRequest {
    /// Amount in USD cents
    pub amount_cents: i64,
    /// Human-readable description shown on the checkout page
    pub description: String,
    /// Merchant-side order id (uuid)
    pub order_id: String,
    /// Redirect after successful payment
    pub success_url: String,
    /// Redirect if the customer cancels
    pub cancel_url: String,
    /// Externally reachable webhook callback URL
    pub callback_url: String,
}

/// A processor-issued invoice
#[derive(Debug, Clone)]
pub struct Invoice {
    /// Processor-assigned invoice id
    pub invoice_id: String,
    /// Hosted checkout page URL
    pub invoice_url: String,
    /// Initial status reported by the processor
    pub status: TopUpStatus,
}

/// Gateway client against the external payment processor.
///
/// Implementations issue HTTPS calls with a bounded timeout and never touch
/// the ledger store. Failures map to `GatewayUnavailable` (transport) or
/// `GatewayRejected` (non-2xx with the processor's status and message).
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create an invoice for the given amount and return its id, hosted
    /// checkout URL and initial status.
    async fn create_invoice(&self, request: &InvoiceRequest) -> TopUpResult<Invoice>;

    /// Fetch the current status of an invoice from the processor.
    async fn invoice_status(&self, invoice_id: &str) -> TopUpResult<TopUpStatus>;

    /// Processor name (for logging)
    fn provider_name(&self) -> &'static str;
}

/// Type alias for a shared gateway handle (dynamic dispatch)
pub type BoxedPaymentGateway = Arc<dyn PaymentGateway>;

/// Redirect and callback URLs attached to every invoice
#[derive(Debug, Clone)]
pub struct CallbackUrls {
    /// URL to redirect after successful payment
    pub success_url: String,
    /// URL to redirect if the customer cancels
    pub cancel_url: String,
    /// Externally reachable webhook callback URL
    pub callback_url: String,
}

impl Default for CallbackUrls {
    fn default() -> Self {
        Self {
            success_url: "http://localhost:5173/top-up-success".to_string(),
            cancel_url: "http://localhost:5173/top-up-cancel".to_string(),
            callback_url: "http://localhost:8080/api/payment-webhook".to_string(),
        }
    }
}
