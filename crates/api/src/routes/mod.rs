//! HTTP routing

pub mod admin;
pub mod invoices;
pub mod notifications;
pub mod webhooks;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde_json::{json, Value};

use crate::auth::session_gate;
use crate::state::AppState;

/// Build the application router. The session gate wraps everything; paths
/// it treats as open (health, webhooks, auth callbacks) are encoded in the
/// gate itself rather than in route grouping.
pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();

    Router::new()
        .route("/health", get(health))
        .route("/webhooks/payments", post(webhooks::receive_payment_event))
        .nest("/api/v1", api_routes())
        .layer(middleware::from_fn_with_state(auth_state, session_gate))
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/invoices", get(invoices::list_invoices))
        .route("/invoices/{id}", get(invoices::get_invoice))
        .route("/payments/intent", post(invoices::create_payment_intent))
        .route("/notifications", get(notifications::list_notifications))
        .route(
            "/notifications/{id}/read",
            post(notifications::mark_notification_read),
        )
        .route("/admin/invariants", get(admin::run_invariant_checks))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let database = match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => "ok",
        Err(e) => {
            tracing::warn!(error = %e, "Health check database probe failed");
            "unavailable"
        }
    };

    Json(json!({
        "status": "ok",
        "database": database,
    }))
}
