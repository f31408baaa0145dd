//! Notification endpoints

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Serialize;
use serde_json::{json, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::PortalUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const LIST_LIMIT: i64 = 50;

#[derive(Debug, sqlx::FromRow, Serialize)]
pub struct NotificationView {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub read: bool,
    pub created_at: OffsetDateTime,
}

/// GET /api/v1/notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(user): Extension<PortalUser>,
) -> ApiResult<Json<Vec<NotificationView>>> {
    let rows: Vec<NotificationView> = sqlx::query_as(
        r#"
        SELECT id, type AS kind, title, message, read, created_at
        FROM notifications
        WHERE practice_id = $1
        ORDER BY created_at DESC
        LIMIT $2
        "#,
    )
    .bind(user.practice_id.0)
    .bind(LIST_LIMIT)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows))
}

/// POST /api/v1/notifications/{id}/read
///
/// The practice filter doubles as the existence check: marking another
/// tenant's notification read reports not found.
pub async fn mark_notification_read(
    State(state): State<AppState>,
    Extension(user): Extension<PortalUser>,
    Path(notification_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let result = sqlx::query(
        "UPDATE notifications SET read = TRUE WHERE id = $1 AND practice_id = $2",
    )
    .bind(notification_id)
    .bind(user.practice_id.0)
    .execute(&state.pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Notification"));
    }

    Ok(Json(json!({ "updated": true })))
}
