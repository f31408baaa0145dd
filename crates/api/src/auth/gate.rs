//! Per-request routing decision and middleware
//!
//! The decision itself is a pure function over (path, authenticated) so the
//! redirect matrix is testable without a server. The middleware resolves the
//! session, applies the decision, and injects the [`PortalUser`] for
//! downstream handlers.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};

use super::session::{extract_session_token, resolve_session, AuthError, AuthState, PortalUser};

/// Auth pages an authenticated user is bounced away from.
const AUTH_PAGES: &[&str] = &["/login", "/signup", "/forgot-password"];

/// Paths that bypass the session gate entirely. The webhook endpoint
/// authenticates by signature, not by session.
const OPEN_PREFIXES: &[&str] = &["/auth", "/invite", "/webhooks", "/health"];

/// What the gate decided for this request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAction {
    Proceed,
    RedirectToLogin,
    RedirectToDashboard,
    /// API paths reject with 401 JSON instead of redirecting.
    Unauthorized,
}

/// Whether a path is served without any session at all.
fn is_open_path(path: &str) -> bool {
    OPEN_PREFIXES.iter().any(|p| path.starts_with(p))
}

/// The routing decision, independent of how the session was resolved.
pub fn gate_action(path: &str, authenticated: bool) -> GateAction {
    if is_open_path(path) {
        return GateAction::Proceed;
    }

    if AUTH_PAGES.iter().any(|p| path.starts_with(p)) {
        return if authenticated {
            GateAction::RedirectToDashboard
        } else {
            GateAction::Proceed
        };
    }

    if path.starts_with("/api") {
        return if authenticated {
            GateAction::Proceed
        } else {
            GateAction::Unauthorized
        };
    }

    if authenticated {
        GateAction::Proceed
    } else {
        GateAction::RedirectToLogin
    }
}

/// Session gate middleware.
///
/// Resolves the caller's identity once per request and, when authenticated,
/// inserts [`PortalUser`] into request extensions so every handler reads the
/// tenant from the same server-derived value.
pub async fn session_gate(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    // Open paths never need a session. Skip resolution entirely so a stale
    // credential on a webhook or health request cannot fail the request.
    if is_open_path(&path) {
        return next.run(request).await;
    }

    let portal_user = match extract_session_token(&request) {
        Some(token) => match resolve_session(&auth_state, &token).await {
            Ok(user) => Some(user),
            Err(AuthError::DatabaseError) => return AuthError::DatabaseError.into_response(),
            Err(err) => {
                tracing::debug!(path = %path, error = %err, "Session did not resolve");
                None
            }
        },
        None => None,
    };

    match gate_action(&path, portal_user.is_some()) {
        GateAction::Proceed => {
            if let Some(user) = portal_user {
                tracing::debug!(
                    path = %path,
                    user_id = %user.user_id,
                    practice_id = %user.practice_id,
                    "Request authenticated"
                );
                request.extensions_mut().insert(user);
            }
            next.run(request).await
        }
        GateAction::RedirectToLogin => Redirect::to("/login").into_response(),
        GateAction::RedirectToDashboard => Redirect::to("/").into_response(),
        GateAction::Unauthorized => AuthError::MissingSession.into_response(),
    }
}
