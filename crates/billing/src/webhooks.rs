//! Payment webhook handling
//!
//! Orchestrates the reconciliation path: signature verification, atomic
//! idempotency claim, event extraction, invoice reconciliation, then the
//! soft side effects (notification, audit entry) and the ledger outcome.

use sqlx::PgPool;
use uuid::Uuid;

use crate::audit::{AuditRecorder, ACTION_PAYMENT_COMPLETED, ACTION_PAYMENT_FAILED};
use crate::error::BillingResult;
use crate::events::{extract, PaymentEvent, ProviderEvent};
use crate::ledger::{IdempotencyLedger, LedgerOutcome};
use crate::notify::Notifier;
use crate::reconcile::{minor_units_to_decimal, InvoiceReconciler};
use crate::verify::SignatureVerifier;

/// Result of handling a verified webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Event was applied to invoice and payment state.
    Processed,
    /// Event id was already in the ledger; nothing was re-applied.
    Duplicate,
    /// Event kind outside the reconciliation flow, or no invoice reference.
    Ignored,
}

pub struct WebhookHandler {
    verifier: SignatureVerifier,
    ledger: IdempotencyLedger,
    reconciler: InvoiceReconciler,
    notifier: Notifier,
    audit: AuditRecorder,
}

impl WebhookHandler {
    pub fn new(webhook_secret: &str, pool: PgPool) -> Self {
        Self {
            verifier: SignatureVerifier::new(webhook_secret),
            ledger: IdempotencyLedger::new(pool.clone()),
            reconciler: InvoiceReconciler::new(pool.clone()),
            notifier: Notifier::new(pool.clone()),
            audit: AuditRecorder::new(pool),
        }
    }

    /// Verify a raw delivery against its signature header.
    ///
    /// Runs before any side effect; an invalid signature never reaches the
    /// ledger or the reconciler.
    pub fn verify_event(&self, payload: &[u8], signature: &str) -> BillingResult<ProviderEvent> {
        self.verifier.verify(payload, signature)
    }

    /// Handle a verified event end to end.
    pub async fn handle_event(&self, event: ProviderEvent) -> BillingResult<WebhookOutcome> {
        let is_new = self
            .ledger
            .check_and_record(&event.id, &event.event_type)
            .await?;

        if !is_new {
            tracing::info!(
                event_id = %event.id,
                event_type = %event.event_type,
                "Duplicate webhook event; skipping"
            );
            return Ok(WebhookOutcome::Duplicate);
        }

        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            "Processing webhook event"
        );

        let result = self.process_event(&event).await;

        match &result {
            Ok(_) => {
                self.ledger
                    .record_outcome(&event.id, LedgerOutcome::Success, None)
                    .await;
            }
            Err(e) => {
                self.ledger
                    .record_outcome(&event.id, LedgerOutcome::Error, Some(&e.to_string()))
                    .await;
            }
        }

        result
    }

    async fn process_event(&self, event: &ProviderEvent) -> BillingResult<WebhookOutcome> {
        match extract(event) {
            PaymentEvent::Succeeded {
                payment_id,
                amount_minor,
                invoice_id: Some(invoice_id),
            } => {
                self.reconciler
                    .apply_succeeded(&payment_id, amount_minor, invoice_id)
                    .await?;
                self.emit_success_side_effects(&payment_id, amount_minor, invoice_id)
                    .await;
                Ok(WebhookOutcome::Processed)
            }
            PaymentEvent::Failed {
                payment_id,
                invoice_id: Some(invoice_id),
                error_message,
            } => {
                self.reconciler
                    .apply_failed(&payment_id, invoice_id, &error_message)
                    .await?;
                self.emit_failure_side_effects(&payment_id, invoice_id, &error_message)
                    .await;
                Ok(WebhookOutcome::Processed)
            }
            PaymentEvent::Succeeded {
                invoice_id: None, ..
            }
            | PaymentEvent::Failed {
                invoice_id: None, ..
            } => {
                tracing::info!(
                    event_id = %event.id,
                    "Payment event carries no invoice reference; nothing to reconcile"
                );
                Ok(WebhookOutcome::Ignored)
            }
            PaymentEvent::Unhandled => {
                tracing::info!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    "Unhandled event type; acknowledged without action"
                );
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    /// Notification and audit writes after a successful reconciliation.
    /// Degradation here is logged, never surfaced to the sender.
    async fn emit_success_side_effects(
        &self,
        payment_id: &str,
        amount_minor: i64,
        invoice_id: Uuid,
    ) {
        let amount = minor_units_to_decimal(amount_minor);
        let practice_id = self.notifier.payment_received(invoice_id, amount).await;

        self.audit
            .record(
                practice_id,
                None,
                ACTION_PAYMENT_COMPLETED,
                "payment",
                payment_id,
                serde_json::json!({ "invoiceId": invoice_id, "amount": amount }),
            )
            .await;
    }

    async fn emit_failure_side_effects(
        &self,
        payment_id: &str,
        invoice_id: Uuid,
        error_message: &str,
    ) {
        let practice_id = self.notifier.payment_failed(invoice_id, error_message).await;

        self.audit
            .record(
                practice_id,
                None,
                ACTION_PAYMENT_FAILED,
                "payment",
                payment_id,
                serde_json::json!({ "invoiceId": invoice_id, "error": error_message }),
            )
            .await;
    }
}
