//! # Ledger Store
//!
//! Persistence seam for top-up and user balance records. Two collections:
//! `topups` keyed by invoice id and `users` keyed by uid.
//!
//! The critical primitive is `apply_status`: a transactional conditional
//! update that writes the new status and, only when the record crosses into
//! a completed state for the first time, credits the user's balance in the
//! same transaction. Keeping the credit condition inside the store's
//! synchronization boundary is what makes concurrent reconciles safe.

use crate::error::{TopUpError, TopUpResult};
use crate::topup::{TopUp, TopUpStatus};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Outcome of a status transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    /// Status stored before this transition
    pub previous: TopUpStatus,
    /// Status stored after this transition
    pub current: TopUpStatus,
    /// Cents credited to the user's balance, if this transition crossed
    /// into a completed state for the first time
    pub credited: Option<i64>,
}

impl StatusChange {
    /// True when the transition changed nothing
    pub fn is_noop(&self) -> bool {
        self.previous == self.current && self.credited.is_none()
    }
}

/// Durable, queryable persistence for top-up and user records
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert a new top-up record. Fails with `DuplicateInvoice` if a record
    /// already exists for the invoice id.
    async fn create_topup(&self, record: TopUp) -> TopUpResult<()>;

    /// Fetch a top-up record by invoice id. Fails with `TopUpNotFound`.
    async fn get_topup(&self, invoice_id: &str) -> TopUpResult<TopUp>;

    /// Atomically transition a top-up's status. When the new status is
    /// completed and the previously stored status was not, the owning user's
    /// balance is incremented by the record's amount in the same transaction.
    /// Re-applying a status a record already holds is a no-op.
    async fn apply_status(
        &self,
        invoice_id: &str,
        new_status: TopUpStatus,
    ) -> TopUpResult<StatusChange>;

    /// Current balance for a user, in cents. Zero for unknown users.
    async fn user_balance(&self, uid: &str) -> TopUpResult<i64>;
}

/// Type alias for a shared ledger handle (dynamic dispatch)
pub type BoxedLedgerStore = Arc<dyn LedgerStore>;

#[derive(Default)]
struct MemoryInner {
    topups: HashMap<String, TopUp>,
    balances: HashMap<String, i64>,
}

/// In-memory ledger.
///
/// A single mutex over both collections stands in for the document store's
/// transaction primitive, so `apply_status` is atomic here too. Used as the
/// test double behind the same trait as the durable sled-backed store.
#[derive(Default)]
pub struct MemoryLedger {
    inner: Mutex<MemoryInner>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn create_topup(&self, record: TopUp) -> TopUpResult<()> {
        let mut inner = self.inner.lock().map_err(|e| TopUpError::Store(e.to_string()))?;
        if inner.topups.contains_key(&record.invoice_id) {
            return Err(TopUpError::DuplicateInvoice {
                invoice_id: record.invoice_id,
            });
        }
        inner.topups.insert(record.invoice_id.clone(), record);
        Ok(())
    }

    async fn get_topup(&self, invoice_id: &str) -> TopUpResult<TopUp> {
        let inner = self.inner.lock().map_err(|e| TopUpError::Store(e.to_string()))?;
        inner
            .topups
            .get(invoice_id)
            .cloned()
            .ok_or_else(|| TopUpError::TopUpNotFound {
                invoice_id: invoice_id.to_string(),
            })
    }

    async fn apply_status(
        &self,
        invoice_id: &str,
        new_status: TopUpStatus,
    ) -> TopUpResult<StatusChange> {
        let mut guard = self.inner.lock().map_err(|e| TopUpError::Store(e.to_string()))?;
        let inner = &mut *guard;
        let record = inner
            .topups
            .get_mut(invoice_id)
            .ok_or_else(|| TopUpError::TopUpNotFound {
                invoice_id: invoice_id.to_string(),
            })?;

        let previous = record.status;
        record.status = new_status;
        if previous != new_status {
            record.updated_at = Utc::now();
        }

        let credited = if new_status.is_completed() && !previous.is_completed() {
            let amount = record.amount_cents;
            let uid = record.uid.clone();
            *inner.balances.entry(uid).or_insert(0) += amount;
            Some(amount)
        } else {
            None
        };

        Ok(StatusChange {
            previous,
            current: new_status,
            credited,
        })
    }

    async fn user_balance(&self, uid: &str) -> TopUpResult<i64> {
        let inner = self.inner.lock().map_err(|e| TopUpError::Store(e.to_string()))?;
        Ok(inner.balances.get(uid).copied().unwrap_or(0))
    }
}
