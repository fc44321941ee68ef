//! # topup-api
//!
//! HTTP transport shell for topup-rs.
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - REST endpoints mapping 1:1 to the lifecycle manager's operations
//! - The processor IPN webhook handler
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/` | Health check |
//! | POST | `/api/create-payment` | Create a top-up invoice |
//! | GET | `/api/payment-status/{payment_id}` | Poll + reconcile an invoice |
//! | POST | `/api/payment-webhook` | Processor IPN callback |

pub mod handlers;
pub mod rate_limit;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::{AppConfig, AppState};
