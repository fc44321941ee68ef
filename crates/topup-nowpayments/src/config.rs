//! # NOWPayments Configuration
//!
//! Configuration for the NOWPayments integration.
//! Secrets are loaded from environment variables.

use std::env;
use topup_core::TopUpError;

/// NOWPayments API configuration
#[derive(Debug, Clone)]
pub struct NowPaymentsConfig {
    /// API key sent in the `x-api-key` header
    pub api_key: String,

    /// IPN secret used to verify webhook signatures. When unset, signature
    /// verification is skipped (the processor account has no IPN secret
    /// configured).
    pub ipn_secret: Option<String>,

    /// API base URL (overridable for testing/mocking)
    pub api_base_url: String,
}

impl NowPaymentsConfig {
    /// Load configuration from environment variables.
    ///
    /// Required: `NOWPAYMENTS_API_KEY`.
    /// Optional: `NOWPAYMENTS_IPN_SECRET`, `NOWPAYMENTS_API_URL`.
    pub fn from_env() -> Result<Self, TopUpError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let api_key = env::var("NOWPAYMENTS_API_KEY").map_err(|_| {
            TopUpError::Configuration("NOWPAYMENTS_API_KEY not set".to_string())
        })?;

        if api_key.trim().is_empty() {
            return Err(TopUpError::Configuration(
                "NOWPAYMENTS_API_KEY is empty".to_string(),
            ));
        }

        let ipn_secret = env::var("NOWPAYMENTS_IPN_SECRET").ok().filter(|s| !s.is_empty());

        let api_base_url = env::var("NOWPAYMENTS_API_URL")
            .unwrap_or_else(|_| "https://api.nowpayments.io".to_string());

        Ok(Self {
            api_key,
            ipn_secret,
            api_base_url,
        })
    }

    /// Create config with explicit values (for testing)
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ipn_secret: None,
            api_base_url: "https://api.nowpayments.io".to_string(),
        }
    }

    /// Builder: set custom API base URL (for testing)
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Builder: set the IPN secret
    pub fn with_ipn_secret(mut self, secret: impl Into<String>) -> Self {
        self.ipn_secret = Some(secret.into());
        self
    }

    /// Whether IPN signatures will be verified
    pub fn verifies_ipn(&self) -> bool {
        self.ipn_secret.is_some()
    }
}
