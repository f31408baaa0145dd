//! Provider event envelope and the normalized event extractor
//!
//! The payment processor delivers a loosely-shaped JSON envelope. Everything
//! downstream of verification works on [`PaymentEvent`], a closed union, so
//! handlers match exhaustively instead of probing dynamic fields.

use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

/// Event types this system reconciles.
pub const EVENT_PAYMENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const EVENT_PAYMENT_FAILED: &str = "payment_intent.payment_failed";

/// A verified provider webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEvent {
    /// Provider-assigned, globally unique event id. Idempotency key.
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    /// Unix timestamp assigned by the provider.
    #[serde(default)]
    pub created: i64,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

/// The slice of a payment intent object the reconciliation flow consumes.
#[derive(Debug, Clone, Deserialize)]
struct PaymentIntentView {
    id: String,
    #[serde(default)]
    amount: i64,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    last_payment_error: Option<LastPaymentError>,
}

#[derive(Debug, Clone, Deserialize)]
struct LastPaymentError {
    message: Option<String>,
}

/// Normalized shape of an inbound payment event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    Succeeded {
        payment_id: String,
        amount_minor: i64,
        /// None when the intent carries no invoice correlation metadata;
        /// the reconciler treats that as nothing to reconcile.
        invoice_id: Option<Uuid>,
    },
    Failed {
        payment_id: String,
        invoice_id: Option<Uuid>,
        error_message: String,
    },
    /// Event kinds outside the two above. Logged and acknowledged.
    Unhandled,
}

/// Map a verified provider event to its normalized shape.
///
/// Pure: malformed payment objects inside a known event type degrade to
/// `Unhandled` rather than failing the delivery.
pub fn extract(event: &ProviderEvent) -> PaymentEvent {
    match event.event_type.as_str() {
        EVENT_PAYMENT_SUCCEEDED => {
            let Some(intent) = parse_intent(event) else {
                return PaymentEvent::Unhandled;
            };
            PaymentEvent::Succeeded {
                invoice_id: invoice_id_from_metadata(&intent.metadata),
                payment_id: intent.id,
                amount_minor: intent.amount,
            }
        }
        EVENT_PAYMENT_FAILED => {
            let Some(intent) = parse_intent(event) else {
                return PaymentEvent::Unhandled;
            };
            let error_message = intent
                .last_payment_error
                .and_then(|e| e.message)
                .unwrap_or_else(|| "Payment failed".to_string());
            PaymentEvent::Failed {
                invoice_id: invoice_id_from_metadata(&intent.metadata),
                payment_id: intent.id,
                error_message,
            }
        }
        _ => PaymentEvent::Unhandled,
    }
}

fn parse_intent(event: &ProviderEvent) -> Option<PaymentIntentView> {
    match serde_json::from_value(event.data.object.clone()) {
        Ok(intent) => Some(intent),
        Err(err) => {
            tracing::warn!(
                event_id = %event.id,
                event_type = %event.event_type,
                error = %err,
                "Payment event object did not match the expected shape"
            );
            None
        }
    }
}

/// Intents created by the interactive pay flow tag the invoice under
/// `invoiceId`. A missing or malformed value means no correlation.
fn invoice_id_from_metadata(metadata: &HashMap<String, String>) -> Option<Uuid> {
    let raw = metadata.get("invoiceId")?;
    match Uuid::parse_str(raw) {
        Ok(id) => Some(id),
        Err(_) => {
            tracing::warn!(invoice_ref = %raw, "Ignoring non-UUID invoiceId in event metadata");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(event_type: &str, object: serde_json::Value) -> ProviderEvent {
        ProviderEvent {
            id: "evt_test_1".to_string(),
            event_type: event_type.to_string(),
            created: 1_700_000_000,
            data: EventData { object },
        }
    }

    #[test]
    fn extracts_succeeded_with_invoice() {
        let invoice_id = Uuid::new_v4();
        let event = envelope(
            EVENT_PAYMENT_SUCCEEDED,
            json!({
                "id": "pi_123",
                "amount": 85000,
                "metadata": { "invoiceId": invoice_id.to_string() }
            }),
        );

        assert_eq!(
            extract(&event),
            PaymentEvent::Succeeded {
                payment_id: "pi_123".to_string(),
                amount_minor: 85000,
                invoice_id: Some(invoice_id),
            }
        );
    }

    #[test]
    fn succeeded_without_metadata_has_no_invoice() {
        let event = envelope(
            EVENT_PAYMENT_SUCCEEDED,
            json!({ "id": "pi_123", "amount": 5000 }),
        );

        match extract(&event) {
            PaymentEvent::Succeeded { invoice_id, .. } => assert_eq!(invoice_id, None),
            other => panic!("expected Succeeded, got {:?}", other),
        }
    }

    #[test]
    fn malformed_invoice_id_is_treated_as_absent() {
        let event = envelope(
            EVENT_PAYMENT_SUCCEEDED,
            json!({
                "id": "pi_123",
                "amount": 5000,
                "metadata": { "invoiceId": "not-a-uuid" }
            }),
        );

        match extract(&event) {
            PaymentEvent::Succeeded { invoice_id, .. } => assert_eq!(invoice_id, None),
            other => panic!("expected Succeeded, got {:?}", other),
        }
    }

    #[test]
    fn extracts_failed_with_error_message() {
        let invoice_id = Uuid::new_v4();
        let event = envelope(
            EVENT_PAYMENT_FAILED,
            json!({
                "id": "pi_456",
                "amount": 85000,
                "metadata": { "invoiceId": invoice_id.to_string() },
                "last_payment_error": { "message": "card_declined" }
            }),
        );

        assert_eq!(
            extract(&event),
            PaymentEvent::Failed {
                payment_id: "pi_456".to_string(),
                invoice_id: Some(invoice_id),
                error_message: "card_declined".to_string(),
            }
        );
    }

    #[test]
    fn failed_without_error_detail_gets_default_message() {
        let event = envelope(EVENT_PAYMENT_FAILED, json!({ "id": "pi_456" }));

        match extract(&event) {
            PaymentEvent::Failed { error_message, .. } => {
                assert_eq!(error_message, "Payment failed")
            }
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[test]
    fn unknown_event_types_are_unhandled() {
        let event = envelope("customer.created", json!({ "id": "cus_1" }));
        assert_eq!(extract(&event), PaymentEvent::Unhandled);
    }

    #[test]
    fn non_object_payload_is_unhandled() {
        let event = envelope(EVENT_PAYMENT_SUCCEEDED, json!("not an object"));
        assert_eq!(extract(&event), PaymentEvent::Unhandled);
    }
}
