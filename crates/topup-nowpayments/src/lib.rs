//! # topup-nowpayments
//!
//! NOWPayments gateway client for topup-rs.
//!
//! This crate provides:
//!
//! 1. **NowPaymentsGateway** - `PaymentGateway` implementation over the
//!    NOWPayments invoice API (create + status poll), USD-priced invoices
//!    settled in USDT (TRC-20)
//! 2. **IPN webhook utilities** - payload parsing and HMAC-SHA512 signature
//!    verification for `x-nowpayments-sig`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use topup_nowpayments::NowPaymentsGateway;
//!
//! // NOWPAYMENTS_API_KEY must be set
//! let gateway = NowPaymentsGateway::from_env()?;
//!
//! let invoice = gateway.create_invoice(&request).await?;
//! // Redirect the customer to invoice.invoice_url
//! ```
//!
//! ## IPN Handling
//!
//! ```rust,ignore
//! use topup_nowpayments::{parse_ipn, verify_ipn_signature};
//!
//! // In your webhook endpoint, with the raw body bytes:
//! if let Some(secret) = &config.ipn_secret {
//!     verify_ipn_signature(&body, signature_header, secret)?;
//! }
//! let event = parse_ipn(&body)?;
//! manager.reconcile(&event.invoice_id, Some(event.status)).await?;
//! ```

pub mod client;
pub mod config;
pub mod webhook;

// Re-exports
pub use client::NowPaymentsGateway;
pub use config::NowPaymentsConfig;
pub use webhook::{
    compute_ipn_signature, parse_ipn, verify_ipn_signature, IpnEvent, IPN_SIGNATURE_HEADER,
};
