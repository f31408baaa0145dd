//! Billing error types

/// Errors from the reconciliation core and the payment provider client.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// Signature header present but verification failed. Boundary reject,
    /// no side effects may have occurred.
    #[error("Webhook signature verification failed")]
    SignatureInvalid,

    /// The idempotency ledger could not be reached. Retryable: the caller
    /// surfaces a 5xx so the provider redelivers.
    #[error("Idempotency ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// Other database failure. Retryable.
    #[error("Database error: {0}")]
    Database(String),

    /// The event referenced an invoice that does not exist. Non-retryable:
    /// redelivery cannot succeed, so the webhook path acknowledges it.
    #[error("Invoice {0} not found")]
    InvoiceNotFound(uuid::Uuid),

    /// Payment provider API call failed. Retryable on the interactive path.
    #[error("Payment provider error: {0}")]
    Provider(String),

    #[error("Billing configuration error: {0}")]
    Config(String),
}

impl BillingError {
    /// Whether redelivery or a user retry can plausibly succeed.
    ///
    /// Retryable errors map to 5xx at the boundary; everything else is
    /// acknowledged so the provider stops redelivering.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BillingError::LedgerUnavailable(_)
                | BillingError::Database(_)
                | BillingError::Provider(_)
        )
    }
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        BillingError::Database(err.to_string())
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
