//! Invoice endpoints and the interactive pay flow
//!
//! Every query here is scoped by the practice id carried in [`PortalUser`];
//! an invoice belonging to another practice is indistinguishable from one
//! that does not exist.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use labportal_billing::ACTION_PAYMENT_INTENT_CREATED;

use crate::auth::PortalUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const STATUS_PENDING: &str = "pending";
const STATUS_PAID: &str = "paid";
const STATUS_OVERDUE: &str = "overdue";

#[derive(Debug, sqlx::FromRow)]
struct InvoiceRow {
    id: Uuid,
    invoice_number: String,
    amount: Decimal,
    amount_paid: Decimal,
    status: String,
    due_date: Option<Date>,
    paid_date: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct InvoiceView {
    pub id: Uuid,
    pub invoice_number: String,
    pub amount: Decimal,
    pub amount_paid: Decimal,
    pub status: String,
    pub due_date: Option<Date>,
    pub paid_date: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow, Serialize)]
pub struct PaymentView {
    pub id: Uuid,
    pub amount: Decimal,
    pub status: String,
    pub payment_method: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct InvoiceDetail {
    #[serde(flatten)]
    pub invoice: InvoiceView,
    pub payments: Vec<PaymentView>,
}

/// Display status with `overdue` derived at read time. Stored status stays
/// `pending`; a payment arriving after the due date still transitions it
/// straight to `paid`.
fn display_status(status: &str, due_date: Option<Date>, today: Date) -> String {
    if status == STATUS_PENDING {
        if let Some(due) = due_date {
            if due < today {
                return STATUS_OVERDUE.to_string();
            }
        }
    }
    status.to_string()
}

fn to_view(row: InvoiceRow, today: Date) -> InvoiceView {
    let status = display_status(&row.status, row.due_date, today);
    InvoiceView {
        id: row.id,
        invoice_number: row.invoice_number,
        amount: row.amount,
        amount_paid: row.amount_paid,
        status,
        due_date: row.due_date,
        paid_date: row.paid_date,
        created_at: row.created_at,
    }
}

/// GET /api/v1/invoices
pub async fn list_invoices(
    State(state): State<AppState>,
    Extension(user): Extension<PortalUser>,
) -> ApiResult<Json<Vec<InvoiceView>>> {
    let rows: Vec<InvoiceRow> = sqlx::query_as(
        r#"
        SELECT id, invoice_number, amount, amount_paid, status, due_date, paid_date, created_at
        FROM invoices
        WHERE practice_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(user.practice_id.0)
    .fetch_all(&state.pool)
    .await?;

    let today = OffsetDateTime::now_utc().date();
    Ok(Json(rows.into_iter().map(|r| to_view(r, today)).collect()))
}

/// GET /api/v1/invoices/{id}
pub async fn get_invoice(
    State(state): State<AppState>,
    Extension(user): Extension<PortalUser>,
    Path(invoice_id): Path<Uuid>,
) -> ApiResult<Json<InvoiceDetail>> {
    let row: Option<InvoiceRow> = sqlx::query_as(
        r#"
        SELECT id, invoice_number, amount, amount_paid, status, due_date, paid_date, created_at
        FROM invoices
        WHERE id = $1 AND practice_id = $2
        "#,
    )
    .bind(invoice_id)
    .bind(user.practice_id.0)
    .fetch_optional(&state.pool)
    .await?;

    let row = row.ok_or(ApiError::NotFound("Invoice"))?;

    let payments: Vec<PaymentView> = sqlx::query_as(
        r#"
        SELECT id, amount, status, payment_method, created_at
        FROM payments
        WHERE invoice_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(invoice_id)
    .fetch_all(&state.pool)
    .await?;

    let today = OffsetDateTime::now_utc().date();
    Ok(Json(InvoiceDetail {
        invoice: to_view(row, today),
        payments,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateIntentRequest {
    pub invoice_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CreateIntentResponse {
    pub client_secret: String,
    /// Amount being charged, in major units.
    pub amount: Decimal,
}

#[derive(Debug, sqlx::FromRow)]
struct PayableInvoiceRow {
    invoice_number: String,
    amount: Decimal,
    amount_paid: Decimal,
    status: String,
}

#[derive(Debug, sqlx::FromRow)]
struct PracticeRow {
    name: String,
    email: Option<String>,
    stripe_customer_id: Option<String>,
}

/// POST /api/v1/payments/intent
///
/// Charges the remaining balance, not the face amount. The processor
/// customer id is created lazily the first time a practice pays and
/// persisted for reuse.
pub async fn create_payment_intent(
    State(state): State<AppState>,
    Extension(user): Extension<PortalUser>,
    Json(request): Json<CreateIntentRequest>,
) -> ApiResult<Json<CreateIntentResponse>> {
    let invoice: Option<PayableInvoiceRow> = sqlx::query_as(
        r#"
        SELECT invoice_number, amount, amount_paid, status
        FROM invoices
        WHERE id = $1 AND practice_id = $2
        "#,
    )
    .bind(request.invoice_id)
    .bind(user.practice_id.0)
    .fetch_optional(&state.pool)
    .await?;

    let invoice = invoice.ok_or(ApiError::NotFound("Invoice"))?;

    if invoice.status == STATUS_PAID {
        return Err(ApiError::BadRequest("Invoice is already paid".to_string()));
    }

    let remaining = invoice.amount - invoice.amount_paid;
    if remaining <= Decimal::ZERO {
        return Err(ApiError::BadRequest(
            "No balance due on this invoice".to_string(),
        ));
    }

    let amount_minor = (remaining * Decimal::from(100))
        .to_i64()
        .ok_or_else(|| ApiError::BadRequest("Invoice amount out of range".to_string()))?;

    let customer_id = resolve_customer_id(&state, &user).await?;

    let description = format!("Payment for Invoice {}", invoice.invoice_number);
    let intent = state
        .billing
        .client
        .create_payment_intent(amount_minor, &customer_id, request.invoice_id, &description)
        .await?;

    state
        .billing
        .audit
        .record(
            Some(user.practice_id.0),
            Some(user.user_id),
            ACTION_PAYMENT_INTENT_CREATED,
            "invoice",
            &request.invoice_id.to_string(),
            json!({
                "payment_intent_id": intent.id,
                "amount": remaining.to_string(),
            }),
        )
        .await;

    Ok(Json(CreateIntentResponse {
        client_secret: intent.client_secret,
        amount: remaining,
    }))
}

/// Fetch the practice's processor customer id, creating and persisting one
/// on first use.
async fn resolve_customer_id(state: &AppState, user: &PortalUser) -> ApiResult<String> {
    let practice: Option<PracticeRow> = sqlx::query_as(
        "SELECT name, email, stripe_customer_id FROM practices WHERE id = $1",
    )
    .bind(user.practice_id.0)
    .fetch_optional(&state.pool)
    .await?;

    let practice = practice.ok_or(ApiError::NotFound("Practice"))?;

    if let Some(customer_id) = practice.stripe_customer_id {
        return Ok(customer_id);
    }

    let customer_id = state
        .billing
        .client
        .create_customer(user.practice_id.0, &practice.name, practice.email.as_deref())
        .await?;

    sqlx::query("UPDATE practices SET stripe_customer_id = $1, updated_at = NOW() WHERE id = $2")
        .bind(&customer_id)
        .bind(user.practice_id.0)
        .execute(&state.pool)
        .await?;

    Ok(customer_id)
}
