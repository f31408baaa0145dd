//! Payment webhook endpoint
//!
//! Responses follow the provider's retry contract: 4xx for rejected
//! deliveries, 500 only for retryable failures, and 200 for everything that
//! must not be redelivered, including duplicates and non-retryable
//! processing failures.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use labportal_billing::WebhookOutcome;

use crate::state::AppState;

const SIGNATURE_HEADER: &str = "stripe-signature";

/// POST /webhooks/payments
pub async fn receive_payment_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // Reject before attempting verification when the header is absent.
    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
    else {
        tracing::warn!("Webhook delivery missing signature header");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing stripe-signature header" })),
        )
            .into_response();
    };

    // Verification runs on the raw body bytes, before any side effect.
    let event = match state.billing.webhooks.verify_event(&body, signature) {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(error = %err, "Webhook signature verification failed");
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Invalid signature" })),
            )
                .into_response();
        }
    };

    let event_id = event.id.clone();

    match state.billing.webhooks.handle_event(event).await {
        Ok(WebhookOutcome::Duplicate) => (
            StatusCode::OK,
            Json(json!({ "received": true, "duplicate": true })),
        )
            .into_response(),
        Ok(_) => (StatusCode::OK, Json(json!({ "received": true }))).into_response(),
        Err(err) if err.is_retryable() => {
            tracing::error!(event_id = %event_id, error = %err, "Retryable webhook failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Temporary failure, please retry" })),
            )
                .into_response()
        }
        Err(err) => {
            // Acknowledge with 200 so the provider stops redelivering an
            // event that can never succeed; the ledger row records the error.
            tracing::error!(event_id = %event_id, error = %err, "Non-retryable webhook failure");
            (
                StatusCode::OK,
                Json(json!({ "received": true, "error": "Webhook processing failed" })),
            )
                .into_response()
        }
    }
}
