//! Idempotency ledger
//!
//! The payment processor delivers at-least-once, including concurrent
//! redeliveries of the same event. The ledger is the single gate that keeps
//! reconciliation at-most-once: the check-and-record is one atomic statement,
//! so of two concurrent deliveries of an event id exactly one claims it.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

/// Terminal outcome recorded against a ledger row after processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOutcome {
    Success,
    Error,
}

impl LedgerOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            LedgerOutcome::Success => "success",
            LedgerOutcome::Error => "error",
        }
    }
}

/// Durable set of processed provider event ids.
#[derive(Clone)]
pub struct IdempotencyLedger {
    pool: PgPool,
}

impl IdempotencyLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Atomically claim an event id for processing.
    ///
    /// Returns `true` if this call inserted the row (the caller may proceed),
    /// `false` if the id was already present (the caller must skip all
    /// further processing and acknowledge the delivery). The INSERT..ON
    /// CONFLICT..RETURNING form guarantees two concurrent deliveries cannot
    /// both observe `true`.
    pub async fn check_and_record(&self, event_id: &str, event_type: &str) -> BillingResult<bool> {
        let claimed: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO webhook_events (event_id, event_type, received_at, processing_result)
            VALUES ($1, $2, NOW(), 'processing')
            ON CONFLICT (event_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(event_id = %event_id, error = %e, "Failed to claim webhook event");
            BillingError::LedgerUnavailable(e.to_string())
        })?;

        Ok(claimed.is_some())
    }

    /// Record the processing outcome on a previously claimed row.
    ///
    /// Best effort: the financially significant writes have already landed by
    /// the time this runs, so a failure here is logged and swallowed.
    pub async fn record_outcome(
        &self,
        event_id: &str,
        outcome: LedgerOutcome,
        error_message: Option<&str>,
    ) {
        let result = sqlx::query(
            r#"
            UPDATE webhook_events
            SET processing_result = $1, error_message = $2
            WHERE event_id = $3
            "#,
        )
        .bind(outcome.as_str())
        .bind(error_message)
        .bind(event_id)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::error!(
                event_id = %event_id,
                outcome = outcome.as_str(),
                error = %e,
                "Failed to record webhook event outcome; row remains 'processing'"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_maps_to_stored_values() {
        assert_eq!(LedgerOutcome::Success.as_str(), "success");
        assert_eq!(LedgerOutcome::Error.as_str(), "error");
    }
}
