//! # NOWPayments IPN Webhooks
//!
//! Parsing and signature verification for IPN callbacks. NOWPayments signs
//! each payload with HMAC-SHA512 over the JSON body with its keys sorted,
//! and sends the hex digest in the `x-nowpayments-sig` header.

use crate::client::de_id;
use serde::Deserialize;
use topup_core::{TopUpError, TopUpResult, TopUpStatus};
use tracing::debug;

/// Signature header carrying the IPN HMAC digest
pub const IPN_SIGNATURE_HEADER: &str = "x-nowpayments-sig";

/// A parsed IPN notification
#[derive(Debug, Clone)]
pub struct IpnEvent {
    /// Invoice the notification is about
    pub invoice_id: String,
    /// Status the processor reports
    pub status: TopUpStatus,
}

#[derive(Debug, Deserialize)]
struct IpnPayload {
    payment_status: String,
    #[serde(deserialize_with = "de_id")]
    invoice_id: String,
}

/// Parse an IPN payload into an event.
///
/// Fails with `WebhookParse` when the body is not JSON, is missing
/// `payment_status`/`invoice_id`, or carries a status outside the
/// processor's vocabulary.
pub fn parse_ipn(payload: &[u8]) -> TopUpResult<IpnEvent> {
    let parsed: IpnPayload = serde_json::from_slice(payload)
        .map_err(|e| TopUpError::WebhookParse(format!("Invalid IPN payload: {}", e)))?;

    let status: TopUpStatus = parsed.payment_status.parse()?;

    debug!(
        "Parsed IPN: invoice_id={}, status={}",
        parsed.invoice_id, status
    );

    Ok(IpnEvent {
        invoice_id: parsed.invoice_id,
        status,
    })
}

/// Verify an IPN signature against the shared IPN secret.
///
/// The signed message is the payload's JSON with keys sorted, matching the
/// processor's signing scheme. Comparison is constant-time.
pub fn verify_ipn_signature(payload: &[u8], signature: &str, secret: &str) -> TopUpResult<()> {
    let expected = compute_ipn_signature(payload, secret)?;

    if !constant_time_compare(signature, &expected) {
        return Err(TopUpError::WebhookVerificationFailed(
            "Signature mismatch".to_string(),
        ));
    }

    Ok(())
}

/// Compute the hex HMAC-SHA512 digest the processor would send for a payload
pub fn compute_ipn_signature(payload: &[u8], secret: &str) -> TopUpResult<String> {
    use hmac::{Hmac, Mac};
    use sha2::Sha512;

    type HmacSha512 = Hmac<Sha512>;

    // Round-trip through serde_json::Value; its object map is ordered by
    // key, which reproduces the processor's sorted-key canonical form
    let value: serde_json::Value = serde_json::from_slice(payload)
        .map_err(|e| TopUpError::WebhookParse(format!("Invalid IPN payload: {}", e)))?;
    let canonical = serde_json::to_string(&value)
        .map_err(|e| TopUpError::Serialization(e.to_string()))?;

    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(canonical.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}
