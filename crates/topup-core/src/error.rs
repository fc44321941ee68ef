//! # Top-Up Error Types
//!
//! Typed error handling for the top-up engine.
//! All lifecycle operations return `Result<T, TopUpError>`.

use thiserror::Error;

/// Core error type for all top-up operations
#[derive(Debug, Error)]
pub enum TopUpError {
    /// Configuration errors (missing env vars, invalid config)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Bad or missing caller input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Network/timeout error talking to the payment processor
    #[error("Gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// Processor returned a non-2xx response
    #[error("Gateway rejected request [{status}]: {message}")]
    GatewayRejected { status: u16, message: String },

    /// A top-up record already exists for this invoice
    #[error("Duplicate invoice: {invoice_id}")]
    DuplicateInvoice { invoice_id: String },

    /// No top-up record for this invoice id
    #[error("Top-up not found: {invoice_id}")]
    TopUpNotFound { invoice_id: String },

    /// Persistence failure in the ledger store
    #[error("Store error: {0}")]
    Store(String),

    /// IPN signature verification failed
    #[error("Webhook verification failed: {0}")]
    WebhookVerificationFailed(String),

    /// Webhook payload could not be parsed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl TopUpError {
    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TopUpError::GatewayUnavailable(_) | TopUpError::Store(_)
        )
    }

    /// Returns the HTTP status code appropriate for this error
    pub fn status_code(&self) -> u16 {
        match self {
            TopUpError::Configuration(_) => 500,
            TopUpError::Validation(_) => 400,
            TopUpError::GatewayUnavailable(_) => 503,
            TopUpError::GatewayRejected { .. } => 502,
            TopUpError::DuplicateInvoice { .. } => 409,
            TopUpError::TopUpNotFound { .. } => 404,
            TopUpError::Store(_) => 500,
            TopUpError::WebhookVerificationFailed(_) => 401,
            TopUpError::WebhookParse(_) => 400,
            TopUpError::Serialization(_) => 500,
        }
    }
}

/// Result type alias for top-up operations
pub type TopUpResult<T> = Result<T, TopUpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(TopUpError::GatewayUnavailable("timeout".into()).is_retryable());
        assert!(TopUpError::Store("lost connection".into()).is_retryable());
        assert!(!TopUpError::GatewayRejected {
            status: 400,
            message: "bad amount".into()
        }
        .is_retryable());
        assert!(!TopUpError::Validation("missing uid".into()).is_retryable());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(TopUpError::Validation("test".into()).status_code(), 400);
        assert_eq!(
            TopUpError::TopUpNotFound {
                invoice_id: "x".into()
            }
            .status_code(),
            404
        );
        assert_eq!(
            TopUpError::GatewayRejected {
                status: 403,
                message: "invalid api key".into()
            }
            .status_code(),
            502
        );
        assert_eq!(
            TopUpError::GatewayUnavailable("connect refused".into()).status_code(),
            503
        );
    }
}
