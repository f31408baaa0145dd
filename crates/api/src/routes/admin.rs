//! Admin endpoints

use axum::extract::State;
use axum::{Extension, Json};

use labportal_billing::InvariantCheckSummary;

use crate::auth::{PortalUser, Role};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// GET /api/v1/admin/invariants
///
/// Runs the read-only consistency checks over invoices, payments and the
/// webhook ledger. Admin role only.
pub async fn run_invariant_checks(
    State(state): State<AppState>,
    Extension(user): Extension<PortalUser>,
) -> ApiResult<Json<InvariantCheckSummary>> {
    if user.role != Role::Admin {
        return Err(ApiError::Forbidden);
    }

    let summary = state.billing.invariants.run_all_checks().await?;
    if !summary.healthy {
        tracing::warn!(
            violations = summary.violations.len(),
            "Invariant check found violations"
        );
    }

    Ok(Json(summary))
}
