// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! LabPortal Billing Module
//!
//! The payment webhook reconciliation core and the payment processor client.
//!
//! ## Flow
//!
//! inbound delivery -> [`SignatureVerifier`] -> [`IdempotencyLedger`]
//! (atomic check-then-record) -> event extraction -> [`InvoiceReconciler`]
//! -> { [`Notifier`], [`AuditRecorder`] }.
//!
//! The idempotency claim is the one true concurrency hazard in the system:
//! the provider delivers at-least-once and may redeliver concurrently.

pub mod audit;
pub mod client;
pub mod error;
pub mod events;
pub mod invariants;
pub mod ledger;
pub mod notify;
pub mod reconcile;
pub mod verify;
pub mod webhooks;


pub use audit::{
    AuditRecorder, ACTION_PAYMENT_COMPLETED, ACTION_PAYMENT_FAILED, ACTION_PAYMENT_INTENT_CREATED,
};
pub use client::{PaymentClient, PaymentConfig, PaymentIntent};
pub use error::{BillingError, BillingResult};
pub use events::{extract, PaymentEvent, ProviderEvent};
pub use invariants::{InvariantChecker, InvariantCheckSummary, InvariantViolation, ViolationSeverity};
pub use ledger::{IdempotencyLedger, LedgerOutcome};
pub use notify::Notifier;
pub use reconcile::{minor_units_to_decimal, InvoiceReconciler};
pub use verify::SignatureVerifier;
pub use webhooks::{WebhookHandler, WebhookOutcome};

use sqlx::PgPool;

/// Billing service combining the webhook handler, the processor client and
/// the invariant checker. Constructed once at process start with the shared
/// HTTP client injected.
pub struct BillingService {
    pub client: PaymentClient,
    pub webhooks: WebhookHandler,
    pub audit: AuditRecorder,
    pub invariants: InvariantChecker,
}

impl BillingService {
    pub fn new(config: PaymentConfig, pool: PgPool, http: reqwest::Client) -> Self {
        Self {
            webhooks: WebhookHandler::new(&config.webhook_secret, pool.clone()),
            audit: AuditRecorder::new(pool.clone()),
            invariants: InvariantChecker::new(pool),
            client: PaymentClient::new(config, http),
        }
    }

    pub fn from_env(pool: PgPool, http: reqwest::Client) -> BillingResult<Self> {
        let config = PaymentConfig::from_env()?;
        Ok(Self::new(config, pool, http))
    }
}
