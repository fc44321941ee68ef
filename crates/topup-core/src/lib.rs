//! # topup-core
//!
//! Core types and traits for the topup-rs crypto top-up backend.
//!
//! This crate provides:
//! - `PaymentLifecycleManager`, the invoice-lifecycle core: initiate a
//!   top-up, then reconcile status reports (polls and webhooks) into an
//!   idempotent, at-most-once balance credit
//! - `PaymentGateway` trait for payment processor clients
//! - `LedgerStore` trait plus `MemoryLedger`, the in-memory test double
//! - `TopUp` / `TopUpStatus` / `UserAccount` records
//! - `TopUpError` for typed error handling
//!
//! ## Example
//!
//! ```rust,ignore
//! use topup_core::{CallbackUrls, InitiateTopUp, PaymentLifecycleManager};
//!
//! let manager = PaymentLifecycleManager::new(gateway, ledger, CallbackUrls::default());
//!
//! let initiated = manager.initiate(InitiateTopUp {
//!     amount: 10.0,
//!     email: "a@x.com".into(),
//!     uid: "u1".into(),
//! }).await?;
//!
//! // Later, from a webhook or a status poll:
//! manager.reconcile(&initiated.invoice_id, Some("confirmed".parse()?)).await?;
//! ```

pub mod error;
pub mod gateway;
pub mod manager;
pub mod store;
pub mod topup;

// Re-exports for convenience
pub use error::{TopUpError, TopUpResult};
pub use gateway::{BoxedPaymentGateway, CallbackUrls, Invoice, InvoiceRequest, PaymentGateway};
pub use manager::{InitiateTopUp, InitiatedTopUp, PaymentLifecycleManager};
pub use store::{BoxedLedgerStore, LedgerStore, MemoryLedger, StatusChange};
pub use topup::{cents_to_usd, usd_to_cents, TopUp, TopUpStatus, UserAccount};
