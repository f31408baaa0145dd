//! Webhook signature verification
//!
//! The provider signs the exact byte stream it sends, so verification runs on
//! the raw request body. Re-encoding a parsed value before verifying would be
//! a correctness bug. The header format is `t=<unix>,v1=<hex hmac>`, with the
//! HMAC-SHA256 computed over `"{t}.{payload}"` using the shared secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{BillingError, BillingResult};
use crate::events::ProviderEvent;

type HmacSha256 = Hmac<Sha256>;

/// Signed timestamps older or newer than this are rejected to limit replay.
const TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// Validates that an inbound payload was produced by the payment processor.
#[derive(Clone)]
pub struct SignatureVerifier {
    webhook_secret: String,
}

impl SignatureVerifier {
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        Self {
            webhook_secret: webhook_secret.into(),
        }
    }

    /// Verify the signature header against the raw body and parse the event.
    ///
    /// Pure validation: no side effects on failure or success.
    pub fn verify(&self, payload: &[u8], signature_header: &str) -> BillingResult<ProviderEvent> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        self.verify_at(payload, signature_header, now)
    }

    /// Verification with an explicit clock, so the tolerance window is
    /// exercisable in tests.
    pub fn verify_at(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: i64,
    ) -> BillingResult<ProviderEvent> {
        let (timestamp, expected_sig) = parse_signature_header(signature_header)?;

        if (now - timestamp).abs() > TIMESTAMP_TOLERANCE_SECS {
            tracing::warn!(
                timestamp,
                now,
                "Webhook signature timestamp outside tolerance window"
            );
            return Err(BillingError::SignatureInvalid);
        }

        // whsec_-prefixed secrets are used verbatim minus the prefix.
        let secret = self
            .webhook_secret
            .strip_prefix("whsec_")
            .unwrap_or(&self.webhook_secret);

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| {
            tracing::error!("Webhook secret rejected by HMAC initialization");
            BillingError::SignatureInvalid
        })?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        let computed = mac.finalize().into_bytes();

        let provided = hex::decode(&expected_sig).map_err(|_| BillingError::SignatureInvalid)?;

        if computed.ct_eq(provided.as_slice()).unwrap_u8() != 1 {
            tracing::warn!("Webhook signature mismatch");
            return Err(BillingError::SignatureInvalid);
        }

        let event: ProviderEvent = serde_json::from_slice(payload).map_err(|err| {
            tracing::error!(error = %err, "Signed webhook payload failed to parse");
            BillingError::SignatureInvalid
        })?;

        Ok(event)
    }
}

/// Parse `t=<unix>,v1=<hex>` into its components. Unknown scheme keys
/// (e.g. `v0`) are ignored.
fn parse_signature_header(header: &str) -> BillingResult<(i64, String)> {
    let mut timestamp: Option<i64> = None;
    let mut v1_signature: Option<String> = None;

    for part in header.split(',') {
        let mut kv = part.trim().splitn(2, '=');
        match (kv.next(), kv.next()) {
            (Some("t"), Some(value)) => timestamp = value.parse().ok(),
            (Some("v1"), Some(value)) => v1_signature = Some(value.to_string()),
            _ => {}
        }
    }

    match (timestamp, v1_signature) {
        (Some(t), Some(sig)) => Ok((t, sig)),
        _ => {
            tracing::warn!("Signature header missing t or v1 component");
            Err(BillingError::SignatureInvalid)
        }
    }
}
