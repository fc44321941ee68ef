//! # topup-ledger
//!
//! Durable `LedgerStore` backed by sled. Two trees act as the document
//! collections: `topups` keyed by invoice id and `users` keyed by uid, both
//! holding JSON documents.
//!
//! The status-update + balance-credit composition runs inside one multi-tree
//! sled transaction, which is the store's synchronization boundary: two
//! reconciles racing to complete the same invoice serialize there, and only
//! the first one credits.

use async_trait::async_trait;
use chrono::Utc;
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use topup_core::{LedgerStore, StatusChange, TopUp, TopUpError, TopUpResult, TopUpStatus, UserAccount};
use tracing::info;

const TOPUPS_TREE: &str = "topups";
const USERS_TREE: &str = "users";

/// Sled-backed ledger store
pub struct SledLedger {
    db: sled::Db,
    topups: sled::Tree,
    users: sled::Tree,
}

impl SledLedger {
    /// Open (or create) the ledger at the given path
    pub fn open(path: impl AsRef<std::path::Path>) -> TopUpResult<Self> {
        let db = sled::open(path).map_err(|e| TopUpError::Store(e.to_string()))?;
        let topups = db
            .open_tree(TOPUPS_TREE)
            .map_err(|e| TopUpError::Store(e.to_string()))?;
        let users = db
            .open_tree(USERS_TREE)
            .map_err(|e| TopUpError::Store(e.to_string()))?;

        info!("Opened ledger: {} top-ups, {} users", topups.len(), users.len());

        Ok(Self { db, topups, users })
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> TopUpResult<()> {
        self.db
            .flush()
            .map(|_| ())
            .map_err(|e| TopUpError::Store(e.to_string()))
    }
}

fn encode<T: serde::Serialize>(value: &T) -> TopUpResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| TopUpError::Serialization(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> TopUpResult<T> {
    serde_json::from_slice(bytes).map_err(|e| TopUpError::Serialization(e.to_string()))
}

fn abort(err: TopUpError) -> ConflictableTransactionError<TopUpError> {
    ConflictableTransactionError::Abort(err)
}

#[async_trait]
impl LedgerStore for SledLedger {
    async fn create_topup(&self, record: TopUp) -> TopUpResult<()> {
        let bytes = encode(&record)?;
        let outcome = self
            .topups
            .compare_and_swap(
                record.invoice_id.as_bytes(),
                None as Option<&[u8]>,
                Some(bytes),
            )
            .map_err(|e| TopUpError::Store(e.to_string()))?;

        if outcome.is_err() {
            return Err(TopUpError::DuplicateInvoice {
                invoice_id: record.invoice_id,
            });
        }
        Ok(())
    }

    async fn get_topup(&self, invoice_id: &str) -> TopUpResult<TopUp> {
        let bytes = self
            .topups
            .get(invoice_id.as_bytes())
            .map_err(|e| TopUpError::Store(e.to_string()))?
            .ok_or_else(|| TopUpError::TopUpNotFound {
                invoice_id: invoice_id.to_string(),
            })?;
        decode(&bytes)
    }

    async fn apply_status(
        &self,
        invoice_id: &str,
        new_status: TopUpStatus,
    ) -> TopUpResult<StatusChange> {
        let result = (&self.topups, &self.users).transaction(|(topups, users)| {
            let bytes = topups.get(invoice_id.as_bytes())?.ok_or_else(|| {
                abort(TopUpError::TopUpNotFound {
                    invoice_id: invoice_id.to_string(),
                })
            })?;
            let mut record: TopUp =
                serde_json::from_slice(&bytes)
                    .map_err(|e| abort(TopUpError::Serialization(e.to_string())))?;

            let previous = record.status;
            record.status = new_status;
            if previous != new_status {
                record.updated_at = Utc::now();
            }

            let credited = if new_status.is_completed() && !previous.is_completed() {
                let mut account = match users.get(record.uid.as_bytes())? {
                    Some(bytes) => serde_json::from_slice::<UserAccount>(&bytes)
                        .map_err(|e| abort(TopUpError::Serialization(e.to_string())))?,
                    None => UserAccount {
                        uid: record.uid.clone(),
                        balance_cents: 0,
                    },
                };
                account.balance_cents += record.amount_cents;
                let account_bytes = serde_json::to_vec(&account)
                    .map_err(|e| abort(TopUpError::Serialization(e.to_string())))?;
                users.insert(record.uid.as_bytes(), account_bytes)?;
                Some(record.amount_cents)
            } else {
                None
            };

            let record_bytes = serde_json::to_vec(&record)
                .map_err(|e| abort(TopUpError::Serialization(e.to_string())))?;
            topups.insert(invoice_id.as_bytes(), record_bytes)?;

            Ok(StatusChange {
                previous,
                current: new_status,
                credited,
            })
        });

        result.map_err(|e| match e {
            TransactionError::Abort(err) => err,
            TransactionError::Storage(err) => TopUpError::Store(err.to_string()),
        })
    }

    async fn user_balance(&self, uid: &str) -> TopUpResult<i64> {
        let account = self
            .users
            .get(uid.as_bytes())
            .map_err(|e| TopUpError::Store(e.to_string()))?;
        match account {
            Some(bytes) => Ok(decode::<UserAccount>(&bytes)?.balance_cents),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn sample_topup(invoice_id: &str, uid: &str, amount_cents: i64) -> TopUp {
        let now = Utc::now();
        TopUp {
            uid: uid.to_string(),
            email: "a@x.com".to_string(),
            amount_cents,
            order_id: "ord-1".to_string(),
            invoice_id: invoice_id.to_string(),
            invoice_url: "https://pay.example/inv/1".to_string(),
            status: TopUpStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = SledLedger::open(dir.path()).unwrap();

        ledger.create_topup(sample_topup("inv1", "u1", 1000)).await.unwrap();
        let record = ledger.get_topup("inv1").await.unwrap();
        assert_eq!(record.uid, "u1");
        assert_eq!(record.amount_cents, 1000);
        assert_eq!(record.status, TopUpStatus::Pending);
    }

    #[tokio::test]
    async fn test_duplicate_invoice() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = SledLedger::open(dir.path()).unwrap();

        ledger.create_topup(sample_topup("inv1", "u1", 1000)).await.unwrap();
        let err = ledger
            .create_topup(sample_topup("inv1", "u2", 500))
            .await
            .unwrap_err();
        assert!(matches!(err, TopUpError::DuplicateInvoice { .. }));
    }

    #[tokio::test]
    async fn test_apply_status_credits_once() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = SledLedger::open(dir.path()).unwrap();
        ledger.create_topup(sample_topup("inv1", "u1", 1000)).await.unwrap();

        let change = ledger.apply_status("inv1", TopUpStatus::Confirmed).await.unwrap();
        assert_eq!(change.previous, TopUpStatus::Pending);
        assert_eq!(change.credited, Some(1000));
        assert_eq!(ledger.user_balance("u1").await.unwrap(), 1000);

        let change = ledger.apply_status("inv1", TopUpStatus::Confirmed).await.unwrap();
        assert!(change.is_noop());
        let change = ledger.apply_status("inv1", TopUpStatus::Finished).await.unwrap();
        assert_eq!(change.credited, None);
        assert_eq!(ledger.user_balance("u1").await.unwrap(), 1000);
    }

    #[tokio::test]
    async fn test_unknown_invoice_never_mutates() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = SledLedger::open(dir.path()).unwrap();

        let err = ledger
            .apply_status("ghost", TopUpStatus::Confirmed)
            .await
            .unwrap_err();
        assert!(matches!(err, TopUpError::TopUpNotFound { .. }));
        assert_eq!(ledger.user_balance("u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_balances_accumulate_across_topups() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = SledLedger::open(dir.path()).unwrap();

        ledger.create_topup(sample_topup("inv1", "u1", 1000)).await.unwrap();
        ledger.create_topup(sample_topup("inv2", "u1", 2500)).await.unwrap();

        ledger.apply_status("inv1", TopUpStatus::Confirmed).await.unwrap();
        ledger.apply_status("inv2", TopUpStatus::Finished).await.unwrap();

        assert_eq!(ledger.user_balance("u1").await.unwrap(), 3500);
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let ledger = SledLedger::open(dir.path()).unwrap();
            ledger.create_topup(sample_topup("inv1", "u1", 1000)).await.unwrap();
            ledger.apply_status("inv1", TopUpStatus::Confirmed).await.unwrap();
            ledger.flush().unwrap();
        }

        let ledger = SledLedger::open(dir.path()).unwrap();
        let record = ledger.get_topup("inv1").await.unwrap();
        assert_eq!(record.status, TopUpStatus::Confirmed);
        assert_eq!(ledger.user_balance("u1").await.unwrap(), 1000);
    }

    #[tokio::test]
    async fn test_concurrent_completion_credits_once() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(SledLedger::open(dir.path()).unwrap());
        ledger.create_topup(sample_topup("inv1", "u1", 1000)).await.unwrap();

        let a = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.apply_status("inv1", TopUpStatus::Confirmed).await })
        };
        let b = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.apply_status("inv1", TopUpStatus::Finished).await })
        };

        let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
        let credits = [a.credited, b.credited].iter().flatten().count();
        assert_eq!(credits, 1);
        assert_eq!(ledger.user_balance("u1").await.unwrap(), 1000);
    }
}
