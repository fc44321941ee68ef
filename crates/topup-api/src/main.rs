//! # topup-rs
//!
//! Crypto top-up backend: creates USD-priced invoices with NOWPayments,
//! tracks their lifecycle in a local ledger, and credits user balances
//! exactly once per completed payment.
//!
//! ## Usage
//!
//! ```bash
//! # Set environment variables
//! export NOWPAYMENTS_API_KEY=...
//! export PORT=8080
//!
//! # Run the server
//! topup-rs
//! ```

use std::net::SocketAddr;
use topup_api::{routes, state::AppState};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    // Initialize application state; this fails fast on missing
    // configuration rather than per-request
    let state = AppState::new()?;

    let addr = state.config.socket_addr();
    let is_prod = state.config.is_production();

    info!("Environment: {}", state.config.environment);
    info!(
        "IPN signature verification: {}",
        if state.ipn_secret.is_some() { "enabled" } else { "disabled" }
    );
    info!("CORS enabled for:");
    for origin in &state.config.allowed_origins {
        info!("   - {}", origin);
    }

    // Create router
    let app = routes::create_router(state);

    // Start server
    info!("🚀 topup-rs starting on http://{}", addr);

    if !is_prod {
        info!("💳 Create payment: POST http://{}/api/create-payment", addr);
        info!("🔔 Webhook: POST http://{}/api/payment-webhook", addr);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
