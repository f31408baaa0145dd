//! In-app notifications emitted by reconciliation
//!
//! The payment event carries no tenant id, so the notifier re-reads the
//! invoice to resolve the owning practice. This is a soft dependency: a
//! missing invoice or a failed insert is logged and swallowed, never fatal to
//! the reconciliation that already happened.

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
struct InvoiceRef {
    practice_id: Uuid,
    invoice_number: String,
}

#[derive(Clone)]
pub struct Notifier {
    pool: PgPool,
}

impl Notifier {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Notify the owning practice that a payment was received.
    ///
    /// Returns the resolved practice id when the invoice was found, so the
    /// audit recorder can attribute the entry to the tenant.
    pub async fn payment_received(&self, invoice_id: Uuid, amount: Decimal) -> Option<Uuid> {
        let invoice = self.invoice_ref(invoice_id).await?;

        let result = sqlx::query(
            r#"
            INSERT INTO notifications (practice_id, type, title, message, metadata)
            VALUES ($1, 'payment_received', 'Payment Received', $2, $3)
            "#,
        )
        .bind(invoice.practice_id)
        .bind(format!(
            "Payment for invoice {} has been processed successfully.",
            invoice.invoice_number
        ))
        .bind(serde_json::json!({ "invoiceId": invoice_id, "amount": amount }))
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!(invoice_id = %invoice_id, error = %e, "Failed to write payment notification");
        }

        Some(invoice.practice_id)
    }

    /// Notify the owning practice that a payment attempt failed.
    pub async fn payment_failed(&self, invoice_id: Uuid, error_message: &str) -> Option<Uuid> {
        let invoice = self.invoice_ref(invoice_id).await?;

        let result = sqlx::query(
            r#"
            INSERT INTO notifications (practice_id, type, title, message, metadata)
            VALUES ($1, 'payment_failed', 'Payment Failed', $2, $3)
            "#,
        )
        .bind(invoice.practice_id)
        .bind(format!(
            "Payment for invoice {} failed: {}",
            invoice.invoice_number, error_message
        ))
        .bind(serde_json::json!({ "invoiceId": invoice_id, "error": error_message }))
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!(invoice_id = %invoice_id, error = %e, "Failed to write payment-failed notification");
        }

        Some(invoice.practice_id)
    }

    async fn invoice_ref(&self, invoice_id: Uuid) -> Option<InvoiceRef> {
        let row: Result<Option<InvoiceRef>, sqlx::Error> = sqlx::query_as(
            "SELECT practice_id, invoice_number FROM invoices WHERE id = $1",
        )
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await;

        match row {
            Ok(Some(invoice)) => Some(invoice),
            Ok(None) => {
                tracing::warn!(invoice_id = %invoice_id, "Skipping notification: invoice no longer exists");
                None
            }
            Err(e) => {
                tracing::warn!(invoice_id = %invoice_id, error = %e, "Skipping notification: invoice lookup failed");
                None
            }
        }
    }
}
