//! Reconciliation invariants
//!
//! Runnable consistency checks over the invoice, payment and ledger tables.
//! Each invariant is a real SQL query; checks only read, never write. Useful
//! after webhook replays or manual data fixes.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BillingResult;

/// A single invariant violation with enough context to debug.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantViolation {
    pub invariant: String,
    pub description: String,
    pub context: serde_json::Value,
    pub severity: ViolationSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationSeverity {
    /// Financial state may be wrong.
    Critical,
    /// Data inconsistency that needs attention.
    High,
    /// Informational.
    Low,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSeverity::Critical => write!(f, "CRITICAL"),
            ViolationSeverity::High => write!(f, "HIGH"),
            ViolationSeverity::Low => write!(f, "LOW"),
        }
    }
}

/// Summary of one invariant run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantCheckSummary {
    pub checked_at: OffsetDateTime,
    pub checks_run: usize,
    pub violations: Vec<InvariantViolation>,
    pub healthy: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct DuplicateCompletedRow {
    stripe_payment_id: String,
    payment_count: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct PaidInvoiceRow {
    id: Uuid,
    invoice_number: String,
}

pub struct InvariantChecker {
    pool: PgPool,
}

impl InvariantChecker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all checks and return a summary.
    pub async fn run_all_checks(&self) -> BillingResult<InvariantCheckSummary> {
        let mut violations = Vec::new();

        violations.extend(self.check_completed_payment_unique().await?);
        violations.extend(self.check_paid_invoice_has_completed_payment().await?);
        violations.extend(self.check_paid_invoice_has_paid_date().await?);

        let healthy = violations.is_empty();
        Ok(InvariantCheckSummary {
            checked_at: OffsetDateTime::now_utc(),
            checks_run: 3,
            violations,
            healthy,
        })
    }

    /// At most one completed payment row per provider payment id.
    async fn check_completed_payment_unique(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<DuplicateCompletedRow> = sqlx::query_as(
            r#"
            SELECT stripe_payment_id, COUNT(*) AS payment_count
            FROM payments
            WHERE status = 'completed'
            GROUP BY stripe_payment_id
            HAVING COUNT(*) > 1
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "completed_payment_unique".to_string(),
                description: format!(
                    "Provider payment {} has {} completed rows",
                    row.stripe_payment_id, row.payment_count
                ),
                context: serde_json::json!({
                    "stripe_payment_id": row.stripe_payment_id,
                    "count": row.payment_count,
                }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Every paid invoice has a completed payment row referencing it.
    async fn check_paid_invoice_has_completed_payment(
        &self,
    ) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<PaidInvoiceRow> = sqlx::query_as(
            r#"
            SELECT i.id, i.invoice_number
            FROM invoices i
            WHERE i.status = 'paid'
              AND NOT EXISTS (
                  SELECT 1 FROM payments p
                  WHERE p.invoice_id = i.id AND p.status = 'completed'
              )
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "paid_invoice_has_completed_payment".to_string(),
                description: format!(
                    "Invoice {} is paid but has no completed payment row",
                    row.invoice_number
                ),
                context: serde_json::json!({ "invoice_id": row.id }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Paid invoices carry a paid_date.
    async fn check_paid_invoice_has_paid_date(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<PaidInvoiceRow> = sqlx::query_as(
            "SELECT id, invoice_number FROM invoices WHERE status = 'paid' AND paid_date IS NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "paid_invoice_has_paid_date".to_string(),
                description: format!("Invoice {} is paid but paid_date is NULL", row.invoice_number),
                context: serde_json::json!({ "invoice_id": row.id }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }
}
