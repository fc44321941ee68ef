//! # Top-Up Types
//!
//! The `TopUp` record tracks one processor invoice and the user it benefits.
//! Amounts are USD-denominated and stored in cents; invoices are paid out in
//! a stablecoin on the processor side.

use crate::error::{TopUpError, TopUpResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Processor-reported invoice status.
///
/// This is the NOWPayments status vocabulary. `Confirmed` and `Finished` are
/// the completed states that trigger a balance credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopUpStatus {
    /// Invoice created, no payment seen yet
    Pending,
    /// Waiting for the customer to send funds
    Waiting,
    /// Payment seen on-chain, awaiting confirmations
    Confirming,
    /// Payment confirmed
    Confirmed,
    /// Processor is forwarding funds to the merchant
    Sending,
    /// Customer sent less than the invoiced amount
    PartiallyPaid,
    /// Funds settled with the merchant
    Finished,
    /// Payment failed
    Failed,
    /// Payment refunded
    Refunded,
    /// Invoice expired unpaid
    Expired,
}

impl TopUpStatus {
    /// Returns the processor's wire name for this status
    pub fn as_str(&self) -> &'static str {
        match self {
            TopUpStatus::Pending => "pending",
            TopUpStatus::Waiting => "waiting",
            TopUpStatus::Confirming => "confirming",
            TopUpStatus::Confirmed => "confirmed",
            TopUpStatus::Sending => "sending",
            TopUpStatus::PartiallyPaid => "partially_paid",
            TopUpStatus::Finished => "finished",
            TopUpStatus::Failed => "failed",
            TopUpStatus::Refunded => "refunded",
            TopUpStatus::Expired => "expired",
        }
    }

    /// Completed states credit the user's balance exactly once
    pub fn is_completed(&self) -> bool {
        matches!(self, TopUpStatus::Confirmed | TopUpStatus::Finished)
    }
}

impl Default for TopUpStatus {
    fn default() -> Self {
        TopUpStatus::Pending
    }
}

impl fmt::Display for TopUpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TopUpStatus {
    type Err = TopUpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TopUpStatus::Pending),
            "waiting" => Ok(TopUpStatus::Waiting),
            "confirming" => Ok(TopUpStatus::Confirming),
            "confirmed" => Ok(TopUpStatus::Confirmed),
            "sending" => Ok(TopUpStatus::Sending),
            "partially_paid" => Ok(TopUpStatus::PartiallyPaid),
            "finished" => Ok(TopUpStatus::Finished),
            "failed" => Ok(TopUpStatus::Failed),
            "refunded" => Ok(TopUpStatus::Refunded),
            "expired" => Ok(TopUpStatus::Expired),
            other => Err(TopUpError::WebhookParse(format!(
                "Unknown payment status: {}",
                other
            ))),
        }
    }
}

/// Convert a decimal USD amount to cents, validating it along the way.
///
/// Rejects non-finite, zero and negative amounts, and amounts so large the
/// cents value would overflow.
pub fn usd_to_cents(amount: f64) -> TopUpResult<i64> {
    if !amount.is_finite() {
        return Err(TopUpError::Validation(
            "Amount must be a finite number".to_string(),
        ));
    }
    if amount <= 0.0 {
        return Err(TopUpError::Validation(
            "Amount must be positive".to_string(),
        ));
    }
    let cents = (amount * 100.0).round();
    if cents > i64::MAX as f64 {
        return Err(TopUpError::Validation("Amount out of range".to_string()));
    }
    Ok(cents as i64)
}

/// Convert cents back to a decimal USD amount
pub fn cents_to_usd(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// Local record tracking one invoice's lifecycle and the user it benefits.
///
/// Keyed by `invoice_id` in the ledger store; exactly one record exists per
/// invoice. The status field is the only field mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopUp {
    /// Owning user id (opaque, trusted from the request)
    pub uid: String,

    /// Contact email supplied at creation
    pub email: String,

    /// Requested top-up amount in USD cents
    pub amount_cents: i64,

    /// Merchant-side order id attached to the invoice (uuid)
    pub order_id: String,

    /// Processor-assigned invoice id; primary key
    pub invoice_id: String,

    /// Hosted checkout page URL
    pub invoice_url: String,

    /// Current invoice status
    #[serde(default)]
    pub status: TopUpStatus,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last status change timestamp
    pub updated_at: DateTime<Utc>,
}

/// A user's accumulated balance document.
///
/// The balance only ever increments, and only as the side effect of a top-up
/// reaching a completed status for the first time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserAccount {
    pub uid: String,
    pub balance_cents: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            TopUpStatus::Pending,
            TopUpStatus::Waiting,
            TopUpStatus::Confirming,
            TopUpStatus::Confirmed,
            TopUpStatus::Sending,
            TopUpStatus::PartiallyPaid,
            TopUpStatus::Finished,
            TopUpStatus::Failed,
            TopUpStatus::Refunded,
            TopUpStatus::Expired,
        ] {
            assert_eq!(status.as_str().parse::<TopUpStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_unknown_status_rejected() {
        let err = "paid_ish".parse::<TopUpStatus>().unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_completed_states() {
        assert!(TopUpStatus::Confirmed.is_completed());
        assert!(TopUpStatus::Finished.is_completed());
        assert!(!TopUpStatus::Pending.is_completed());
        assert!(!TopUpStatus::PartiallyPaid.is_completed());
        assert!(!TopUpStatus::Failed.is_completed());
    }

    #[test]
    fn test_usd_to_cents() {
        assert_eq!(usd_to_cents(10.0).unwrap(), 1000);
        assert_eq!(usd_to_cents(10.99).unwrap(), 1099);
        assert_eq!(usd_to_cents(0.01).unwrap(), 1);
        assert_eq!(cents_to_usd(1099), 10.99);
    }

    #[test]
    fn test_invalid_amounts() {
        assert!(usd_to_cents(0.0).is_err());
        assert!(usd_to_cents(-5.0).is_err());
        assert!(usd_to_cents(f64::NAN).is_err());
        assert!(usd_to_cents(f64::INFINITY).is_err());
    }
}
