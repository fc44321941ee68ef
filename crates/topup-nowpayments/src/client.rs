//! # NOWPayments Gateway Client
//!
//! `PaymentGateway` implementation against the NOWPayments invoice API.
//! Invoices are priced in USD and paid in USDT (TRC-20); the processor hosts
//! the checkout page.

use crate::config::NowPaymentsConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use topup_core::{
    cents_to_usd, Invoice, InvoiceRequest, PaymentGateway, TopUpError, TopUpResult, TopUpStatus,
};
use tracing::{debug, error, info, instrument};

/// Price currency for every invoice
const PRICE_CURRENCY: &str = "usd";
/// Settlement currency the customer pays in
const PAY_CURRENCY: &str = "usdttrc20";
/// Outbound request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// NOWPayments gateway client
pub struct NowPaymentsGateway {
    config: NowPaymentsConfig,
    client: Client,
}

impl NowPaymentsGateway {
    /// Create a new gateway client
    pub fn new(config: NowPaymentsConfig) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self { config, client }
    }

    /// Create from environment variables
    pub fn from_env() -> TopUpResult<Self> {
        let config = NowPaymentsConfig::from_env()?;
        Ok(Self::new(config))
    }

    /// Shared access to the underlying config (for IPN verification)
    pub fn config(&self) -> &NowPaymentsConfig {
        &self.config
    }

    fn rejected(status: reqwest::StatusCode, body: &str) -> TopUpError {
        error!("NOWPayments API error: status={}, body={}", status, body);

        // Prefer the processor's own error message when it parses
        if let Ok(err) = serde_json::from_str::<NowErrorResponse>(body) {
            return TopUpError::GatewayRejected {
                status: status.as_u16(),
                message: err.message,
            };
        }

        TopUpError::GatewayRejected {
            status: status.as_u16(),
            message: format!("HTTP {}: {}", status, body),
        }
    }
}

#[async_trait]
impl PaymentGateway for NowPaymentsGateway {
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_invoice(&self, request: &InvoiceRequest) -> TopUpResult<Invoice> {
        let body = CreateInvoiceBody {
            price_amount: cents_to_usd(request.amount_cents),
            price_currency: PRICE_CURRENCY,
            pay_currency: PAY_CURRENCY,
            order_id: &request.order_id,
            order_description: &request.description,
            success_url: &request.success_url,
            cancel_url: &request.cancel_url,
            ipn_callback_url: &request.callback_url,
        };

        debug!(
            "Creating NOWPayments invoice: price_amount={}",
            body.price_amount
        );

        let url = format!("{}/v1/invoice", self.config.api_base_url);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TopUpError::GatewayUnavailable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TopUpError::GatewayUnavailable(e.to_string()))?;

        if !status.is_success() {
            return Err(Self::rejected(status, &body));
        }

        let invoice: NowInvoiceResponse = serde_json::from_str(&body).map_err(|e| {
            TopUpError::Serialization(format!("Failed to parse NOWPayments response: {}", e))
        })?;

        let status = match invoice.invoice_status {
            Some(ref s) => s.parse().map_err(|_| {
                TopUpError::Serialization(format!("Unknown invoice status: {}", s))
            })?,
            None => TopUpStatus::Pending,
        };

        info!(
            "Created NOWPayments invoice: id={}, url={}",
            invoice.invoice_id, invoice.invoice_url
        );

        Ok(Invoice {
            invoice_id: invoice.invoice_id,
            invoice_url: invoice.invoice_url,
            status,
        })
    }

    #[instrument(skip(self))]
    async fn invoice_status(&self, invoice_id: &str) -> TopUpResult<TopUpStatus> {
        let url = format!("{}/v1/invoice/{}", self.config.api_base_url, invoice_id);
        let response = self
            .client
            .get(&url)
            .header("x-api-key", &self.config.api_key)
            .send()
            .await
            .map_err(|e| TopUpError::GatewayUnavailable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TopUpError::GatewayUnavailable(e.to_string()))?;

        if !status.is_success() {
            return Err(Self::rejected(status, &body));
        }

        let parsed: NowInvoiceStatusResponse = serde_json::from_str(&body).map_err(|e| {
            TopUpError::Serialization(format!("Failed to parse NOWPayments response: {}", e))
        })?;

        parsed.invoice_status.parse().map_err(|_| {
            TopUpError::Serialization(format!(
                "Unknown invoice status: {}",
                parsed.invoice_status
            ))
        })
    }

    fn provider_name(&self) -> &'static str {
        "nowpayments"
    }
}

// =============================================================================
// NOWPayments API Types
// =============================================================================

#[derive(Debug, Serialize)]
struct CreateInvoiceBody<'a> {
    price_amount: f64,
    price_currency: &'a str,
    pay_currency: &'a str,
    order_id: &'a str,
    order_description: &'a str,
    success_url: &'a str,
    cancel_url: &'a str,
    ipn_callback_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct NowInvoiceResponse {
    // The API reports the invoice id as a bare number under "id"; older
    // payloads use "invoice_id" as a string
    #[serde(alias = "id", alias = "invoice_id", deserialize_with = "de_id")]
    invoice_id: String,
    invoice_url: String,
    #[serde(default)]
    invoice_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NowInvoiceStatusResponse {
    invoice_status: String,
}

#[derive(Debug, Deserialize)]
struct NowErrorResponse {
    message: String,
}

/// Accept an id given either as a JSON string or a JSON number
pub(crate) fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(i64),
    }

    Ok(match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s,
        StringOrNumber::Number(n) => n.to_string(),
    })
}
