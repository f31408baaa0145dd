//! Audit log recorder
//!
//! Append-only compliance trail. Invoice correctness takes priority over
//! audit completeness: a failed audit write never rolls back reconciliation,
//! it is logged as an operational warning instead.

use sqlx::PgPool;
use uuid::Uuid;

/// Action names recorded by the reconciliation flow.
pub const ACTION_PAYMENT_COMPLETED: &str = "payment_completed";
pub const ACTION_PAYMENT_FAILED: &str = "payment_failed";
pub const ACTION_PAYMENT_INTENT_CREATED: &str = "payment_intent_created";

#[derive(Clone)]
pub struct AuditRecorder {
    pool: PgPool,
}

impl AuditRecorder {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append one audit entry. `user_id` is None for system actions such as
    /// webhook reconciliation.
    pub async fn record(
        &self,
        practice_id: Option<Uuid>,
        user_id: Option<Uuid>,
        action: &str,
        resource_type: &str,
        resource_id: &str,
        metadata: serde_json::Value,
    ) {
        let result = sqlx::query(
            r#"
            INSERT INTO audit_logs (practice_id, user_id, action, resource_type, resource_id, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(practice_id)
        .bind(user_id)
        .bind(action)
        .bind(resource_type)
        .bind(resource_id)
        .bind(metadata)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!(
                action = %action,
                resource_type = %resource_type,
                resource_id = %resource_id,
                error = %e,
                "Audit log write failed; reconciliation result is unaffected"
            );
        }
    }
}
