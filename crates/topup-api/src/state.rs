//! # Application State
//!
//! Shared state for the axum application: the lifecycle manager (with its
//! gateway and ledger dependencies injected once at startup), configuration,
//! and the per-IP rate limiter.

use crate::rate_limit::{new_api_rate_limiter, ApiRateLimiter};
use std::sync::Arc;
use topup_core::{BoxedLedgerStore, BoxedPaymentGateway, CallbackUrls, PaymentLifecycleManager, TopUpError};
use topup_ledger::SledLedger;
use topup_nowpayments::NowPaymentsGateway;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on (required)
    pub port: u16,
    /// Environment (development, staging, production)
    pub environment: String,
    /// Origins allowed to call the API from a browser
    pub allowed_origins: Vec<String>,
    /// Redirect after successful payment
    pub success_url: String,
    /// Redirect if the customer cancels
    pub cancel_url: String,
    /// Externally reachable IPN callback URL
    pub callback_url: String,
    /// Filesystem path for the sled ledger
    pub ledger_path: String,
    /// Per-IP request ceiling on the API routes
    pub rate_limit_per_minute: u32,
}

impl AppConfig {
    /// Load from environment variables.
    ///
    /// `PORT` is required; startup aborts with a diagnostic when it is
    /// missing or unparseable.
    pub fn from_env() -> Result<Self, TopUpError> {
        dotenvy::dotenv().ok();

        let port = std::env::var("PORT")
            .map_err(|_| TopUpError::Configuration("PORT not set".to_string()))?
            .parse()
            .map_err(|_| TopUpError::Configuration("PORT is not a valid port number".to_string()))?;

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port,
            environment: std::env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),
            allowed_origins,
            success_url: std::env::var("SUCCESS_URL")
                .unwrap_or_else(|_| "http://localhost:5173/top-up-success".to_string()),
            cancel_url: std::env::var("CANCEL_URL")
                .unwrap_or_else(|_| "http://localhost:5173/top-up-cancel".to_string()),
            callback_url: std::env::var("IPN_CALLBACK_URL")
                .unwrap_or_else(|_| format!("http://localhost:{}/api/payment-webhook", port)),
            ledger_path: std::env::var("LEDGER_PATH").unwrap_or_else(|_| "data/ledger".to_string()),
            rate_limit_per_minute: std::env::var("RATE_LIMIT_PER_MINUTE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
        })
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> std::net::SocketAddr {
        format!("{}:{}", self.host, self.port)
            .parse()
            .expect("Invalid socket address")
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    fn callback_urls(&self) -> CallbackUrls {
        CallbackUrls {
            success_url: self.success_url.clone(),
            cancel_url: self.cancel_url.clone(),
            callback_url: self.callback_url.clone(),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// The payment lifecycle core
    pub manager: Arc<PaymentLifecycleManager>,
    /// IPN secret; when set, webhook signatures are enforced
    pub ipn_secret: Option<String>,
    /// Application config
    pub config: AppConfig,
    /// Per-IP rate limiter for the API routes
    pub rate_limiter: ApiRateLimiter,
}

impl AppState {
    /// Build the production state: NOWPayments gateway and sled ledger,
    /// wired from environment configuration.
    pub fn new() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()
            .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

        let gateway = NowPaymentsGateway::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to initialize NOWPayments: {}", e))?;
        let ipn_secret = gateway.config().ipn_secret.clone();

        let ledger = SledLedger::open(&config.ledger_path)
            .map_err(|e| anyhow::anyhow!("Failed to open ledger at {}: {}", config.ledger_path, e))?;

        Ok(Self::with_parts(
            Arc::new(gateway),
            Arc::new(ledger),
            config,
            ipn_secret,
        ))
    }

    /// Assemble state from explicit parts (tests inject doubles here)
    pub fn with_parts(
        gateway: BoxedPaymentGateway,
        ledger: BoxedLedgerStore,
        config: AppConfig,
        ipn_secret: Option<String>,
    ) -> Self {
        let manager = Arc::new(PaymentLifecycleManager::new(
            gateway,
            ledger,
            config.callback_urls(),
        ));
        let rate_limiter = new_api_rate_limiter(config.rate_limit_per_minute);

        Self {
            manager,
            ipn_secret,
            config,
            rate_limiter,
        }
    }
}
