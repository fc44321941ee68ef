//! # Payment Lifecycle Manager
//!
//! Orchestrates invoice creation, status polling and webhook-driven state
//! transitions. Polling and webhooks funnel into the single `reconcile`
//! operation so the balance-crediting rule exists in exactly one place.
//!
//! State machine per top-up record:
//!
//! ```text
//! pending --processor reports completed--> confirmed|finished (credit once)
//! pending --processor reports other------> new status (no credit)
//! completed --any later report----------> completed (no-op, never re-credit)
//! ```

use crate::error::{TopUpError, TopUpResult};
use crate::gateway::{BoxedPaymentGateway, CallbackUrls, InvoiceRequest};
use crate::store::{BoxedLedgerStore, StatusChange};
use crate::topup::{usd_to_cents, TopUp, TopUpStatus};
use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Validated top-up initiation request
#[derive(Debug, Clone)]
pub struct InitiateTopUp {
    /// Requested amount in USD (positive decimal)
    pub amount: f64,
    /// Contact email
    pub email: String,
    /// Owning user id
    pub uid: String,
}

/// Result of initiating a top-up
#[derive(Debug, Clone)]
pub struct InitiatedTopUp {
    pub invoice_id: String,
    pub invoice_url: String,
    pub status: TopUpStatus,
}

/// The lifecycle manager. Dependencies are injected at construction so tests
/// can swap in gateway and ledger doubles.
pub struct PaymentLifecycleManager {
    gateway: BoxedPaymentGateway,
    ledger: BoxedLedgerStore,
    urls: CallbackUrls,
}

impl PaymentLifecycleManager {
    pub fn new(gateway: BoxedPaymentGateway, ledger: BoxedLedgerStore, urls: CallbackUrls) -> Self {
        Self {
            gateway,
            ledger,
            urls,
        }
    }

    /// Create an invoice with the processor and persist a `pending` top-up
    /// record for it.
    #[instrument(skip(self, request), fields(uid = %request.uid))]
    pub async fn initiate(&self, request: InitiateTopUp) -> TopUpResult<InitiatedTopUp> {
        let amount_cents = usd_to_cents(request.amount)?;
        if request.uid.trim().is_empty() {
            return Err(TopUpError::Validation("Missing uid".to_string()));
        }
        if request.email.trim().is_empty() || !request.email.contains('@') {
            return Err(TopUpError::Validation(
                "Missing or malformed email".to_string(),
            ));
        }

        let order_id = Uuid::new_v4().to_string();
        let invoice = self
            .gateway
            .create_invoice(&InvoiceRequest {
                amount_cents,
                description: format!("Top-up for {}", request.email),
                order_id: order_id.clone(),
                success_url: self.urls.success_url.clone(),
                cancel_url: self.urls.cancel_url.clone(),
                callback_url: self.urls.callback_url.clone(),
            })
            .await?;

        let now = Utc::now();
        self.ledger
            .create_topup(TopUp {
                uid: request.uid,
                email: request.email,
                amount_cents,
                order_id,
                invoice_id: invoice.invoice_id.clone(),
                invoice_url: invoice.invoice_url.clone(),
                status: invoice.status,
                created_at: now,
                updated_at: now,
            })
            .await?;

        info!(
            invoice_id = %invoice.invoice_id,
            amount_cents,
            "Created top-up invoice"
        );

        Ok(InitiatedTopUp {
            invoice_id: invoice.invoice_id,
            invoice_url: invoice.invoice_url,
            status: invoice.status,
        })
    }

    /// Bring a top-up record in line with the processor's view of the
    /// invoice and credit the user's balance when it first completes.
    ///
    /// `reported_status` is the status carried by a webhook payload; the
    /// polling path passes `None` and the current status is fetched from the
    /// gateway instead. The credit is conditional on the previously stored
    /// status inside the store's transaction, so repeated deliveries and
    /// concurrent calls credit at most once.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn reconcile(
        &self,
        invoice_id: &str,
        reported_status: Option<TopUpStatus>,
    ) -> TopUpResult<StatusChange> {
        // Surface TopUpNotFound before any gateway call for unknown invoices
        let record = self.ledger.get_topup(invoice_id).await?;

        let new_status = match reported_status {
            Some(status) => status,
            None => self.gateway.invoice_status(invoice_id).await?,
        };

        let change = self.ledger.apply_status(invoice_id, new_status).await?;

        if let Some(credited) = change.credited {
            info!(
                uid = %record.uid,
                credited,
                status = %change.current,
                "Top-up completed, balance credited"
            );
        } else if change.previous != change.current {
            info!(
                previous = %change.previous,
                current = %change.current,
                "Top-up status updated"
            );
        } else {
            warn!(status = %change.current, "Reconcile was a no-op");
        }

        Ok(change)
    }

    /// Current balance for a user, in cents
    pub async fn user_balance(&self, uid: &str) -> TopUpResult<i64> {
        self.ledger.user_balance(uid).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{Invoice, PaymentGateway};
    use crate::store::{LedgerStore, MemoryLedger};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Gateway double: hands out sequential invoice ids and a fixed poll status
    struct FakeGateway {
        created: AtomicUsize,
        poll_status: TopUpStatus,
        fail_create: bool,
    }

    impl FakeGateway {
        fn new(poll_status: TopUpStatus) -> Self {
            Self {
                created: AtomicUsize::new(0),
                poll_status,
                fail_create: false,
            }
        }

        fn failing() -> Self {
            Self {
                created: AtomicUsize::new(0),
                poll_status: TopUpStatus::Pending,
                fail_create: true,
            }
        }
    }

    #[async_trait]
    impl PaymentGateway for FakeGateway {
        async fn create_invoice(&self, request: &InvoiceRequest) -> TopUpResult<Invoice> {
            if self.fail_create {
                return Err(TopUpError::GatewayUnavailable("connect timeout".into()));
            }
            assert!(request.amount_cents > 0);
            let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Invoice {
                invoice_id: format!("inv{}", n),
                invoice_url: format!("https://pay.example/inv{}", n),
                status: TopUpStatus::Pending,
            })
        }

        async fn invoice_status(&self, _invoice_id: &str) -> TopUpResult<TopUpStatus> {
            Ok(self.poll_status)
        }

        fn provider_name(&self) -> &'static str {
            "fake"
        }
    }

    fn manager_with(
        gateway: FakeGateway,
    ) -> (PaymentLifecycleManager, Arc<MemoryLedger>) {
        let ledger = Arc::new(MemoryLedger::new());
        let manager = PaymentLifecycleManager::new(
            Arc::new(gateway),
            ledger.clone(),
            CallbackUrls::default(),
        );
        (manager, ledger)
    }

    fn initiate_request(amount: f64) -> InitiateTopUp {
        InitiateTopUp {
            amount,
            email: "a@x.com".to_string(),
            uid: "u1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_initiate_persists_pending_record() {
        let (manager, ledger) = manager_with(FakeGateway::new(TopUpStatus::Pending));

        let initiated = manager.initiate(initiate_request(10.0)).await.unwrap();
        assert_eq!(initiated.status, TopUpStatus::Pending);

        let record = ledger.get_topup(&initiated.invoice_id).await.unwrap();
        assert_eq!(record.status, TopUpStatus::Pending);
        assert_eq!(record.amount_cents, 1000);
        assert_eq!(record.uid, "u1");
        assert!(!record.order_id.is_empty());
    }

    #[tokio::test]
    async fn test_initiate_validation() {
        let (manager, _) = manager_with(FakeGateway::new(TopUpStatus::Pending));

        for bad in [0.0, -3.0, f64::NAN] {
            let err = manager.initiate(initiate_request(bad)).await.unwrap_err();
            assert!(matches!(err, TopUpError::Validation(_)));
        }

        let err = manager
            .initiate(InitiateTopUp {
                amount: 10.0,
                email: "not-an-email".to_string(),
                uid: "u1".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TopUpError::Validation(_)));

        let err = manager
            .initiate(InitiateTopUp {
                amount: 10.0,
                email: "a@x.com".to_string(),
                uid: "  ".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TopUpError::Validation(_)));
    }

    #[tokio::test]
    async fn test_initiate_gateway_failure_writes_nothing() {
        let (manager, ledger) = manager_with(FakeGateway::failing());

        let err = manager.initiate(initiate_request(10.0)).await.unwrap_err();
        assert!(matches!(err, TopUpError::GatewayUnavailable(_)));
        assert!(ledger.get_topup("inv1").await.is_err());
    }

    #[tokio::test]
    async fn test_reconcile_credits_once() {
        let (manager, _) = manager_with(FakeGateway::new(TopUpStatus::Pending));
        let initiated = manager.initiate(initiate_request(10.0)).await.unwrap();

        // Webhook reports confirmed: status moves, balance credited
        let change = manager
            .reconcile(&initiated.invoice_id, Some(TopUpStatus::Confirmed))
            .await
            .unwrap();
        assert_eq!(change.credited, Some(1000));
        assert_eq!(manager.user_balance("u1").await.unwrap(), 1000);

        // Duplicate webhook delivery: same stored state, no second credit
        let change = manager
            .reconcile(&initiated.invoice_id, Some(TopUpStatus::Confirmed))
            .await
            .unwrap();
        assert!(change.is_noop());
        assert_eq!(manager.user_balance("u1").await.unwrap(), 1000);
    }

    #[tokio::test]
    async fn test_poll_path_queries_gateway() {
        let (manager, _) = manager_with(FakeGateway::new(TopUpStatus::Confirming));
        let initiated = manager.initiate(initiate_request(25.0)).await.unwrap();

        let change = manager.reconcile(&initiated.invoice_id, None).await.unwrap();
        assert_eq!(change.current, TopUpStatus::Confirming);
        assert_eq!(change.credited, None);
        assert_eq!(manager.user_balance("u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_poll_then_webhook_still_single_credit() {
        let (manager, _) = manager_with(FakeGateway::new(TopUpStatus::Finished));
        let initiated = manager.initiate(initiate_request(10.0)).await.unwrap();

        // Poll sees finished and credits
        let change = manager.reconcile(&initiated.invoice_id, None).await.unwrap();
        assert_eq!(change.credited, Some(1000));

        // A late webhook for the same completion arrives
        let change = manager
            .reconcile(&initiated.invoice_id, Some(TopUpStatus::Finished))
            .await
            .unwrap();
        assert_eq!(change.credited, None);
        assert_eq!(manager.user_balance("u1").await.unwrap(), 1000);
    }

    #[tokio::test]
    async fn test_reconcile_unknown_invoice() {
        let (manager, ledger) = manager_with(FakeGateway::new(TopUpStatus::Confirmed));

        let err = manager
            .reconcile("no-such-invoice", Some(TopUpStatus::Confirmed))
            .await
            .unwrap_err();
        assert!(matches!(err, TopUpError::TopUpNotFound { .. }));
        assert_eq!(ledger.user_balance("u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_reconciles_credit_once() {
        let ledger = Arc::new(MemoryLedger::new());
        let manager = Arc::new(PaymentLifecycleManager::new(
            Arc::new(FakeGateway::new(TopUpStatus::Confirmed)),
            ledger.clone(),
            CallbackUrls::default(),
        ));
        let initiated = manager.initiate(initiate_request(10.0)).await.unwrap();

        // Webhook and poll racing for the same invoice
        let webhook = {
            let manager = manager.clone();
            let id = initiated.invoice_id.clone();
            tokio::spawn(async move { manager.reconcile(&id, Some(TopUpStatus::Confirmed)).await })
        };
        let poll = {
            let manager = manager.clone();
            let id = initiated.invoice_id.clone();
            tokio::spawn(async move { manager.reconcile(&id, None).await })
        };

        let (a, b) = (webhook.await.unwrap().unwrap(), poll.await.unwrap().unwrap());
        let credits = [a.credited, b.credited].iter().flatten().count();
        assert_eq!(credits, 1);
        assert_eq!(manager.user_balance("u1").await.unwrap(), 1000);
    }
}
