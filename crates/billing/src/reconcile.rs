//! Invoice reconciliation
//!
//! Applies a normalized payment event to the invoice and payment tables. The
//! success path runs the payment insert and the invoice transition in one
//! transaction: a completed payment row exists if and only if the invoice
//! update landed.

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

/// Convert a provider minor-unit amount (cents) to decimal currency.
pub fn minor_units_to_decimal(amount_minor: i64) -> Decimal {
    Decimal::new(amount_minor, 2)
}

/// A payment insert referencing a missing invoice trips the foreign key
/// (SQLSTATE 23503). That is the event pointing at an invoice we do not
/// have, not a transient store failure, so it maps to the non-retryable
/// [`BillingError::InvoiceNotFound`].
fn map_payment_insert_error(err: sqlx::Error, invoice_id: Uuid) -> BillingError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23503") => {
            BillingError::InvoiceNotFound(invoice_id)
        }
        _ => BillingError::from(err),
    }
}

#[derive(Clone)]
pub struct InvoiceReconciler {
    pool: PgPool,
}

impl InvoiceReconciler {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply a successful payment: record the completed payment row and mark
    /// the invoice paid, atomically.
    ///
    /// Rolls back and returns [`BillingError::InvoiceNotFound`] when the
    /// referenced invoice does not exist; no payment row survives in that
    /// case.
    pub async fn apply_succeeded(
        &self,
        payment_id: &str,
        amount_minor: i64,
        invoice_id: Uuid,
    ) -> BillingResult<()> {
        let amount = minor_units_to_decimal(amount_minor);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO payments (invoice_id, amount, stripe_payment_id, status, payment_method)
            VALUES ($1, $2, $3, 'completed', 'card')
            "#,
        )
        .bind(invoice_id)
        .bind(amount)
        .bind(payment_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_payment_insert_error(e, invoice_id))?;

        let updated = sqlx::query(
            r#"
            UPDATE invoices
            SET status = 'paid', paid_date = NOW(), amount_paid = $1, updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(amount)
        .bind(invoice_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            tracing::warn!(
                invoice_id = %invoice_id,
                payment_id = %payment_id,
                "Payment event referenced a missing invoice; rolled back"
            );
            return Err(BillingError::InvoiceNotFound(invoice_id));
        }

        tx.commit().await?;

        tracing::info!(
            invoice_id = %invoice_id,
            payment_id = %payment_id,
            amount = %amount,
            "Invoice reconciled as paid"
        );

        Ok(())
    }

    /// Record a failed payment attempt. The invoice is not mutated.
    pub async fn apply_failed(
        &self,
        payment_id: &str,
        invoice_id: Uuid,
        error_message: &str,
    ) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (invoice_id, amount, stripe_payment_id, status, metadata)
            VALUES ($1, 0, $2, 'failed', $3)
            "#,
        )
        .bind(invoice_id)
        .bind(payment_id)
        .bind(serde_json::json!({ "error": error_message }))
        .execute(&self.pool)
        .await
        .map_err(|e| map_payment_insert_error(e, invoice_id))?;

        tracing::info!(
            invoice_id = %invoice_id,
            payment_id = %payment_id,
            error = %error_message,
            "Failed payment attempt recorded"
        );

        Ok(())
    }
}
