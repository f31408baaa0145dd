//! Session resolution
//!
//! Sessions are issued and refreshed by the identity provider; this module
//! only verifies them. A token is verified by calling the provider's user
//! endpoint, with results cached briefly to keep dashboard request bursts
//! from hitting provider rate limits. The provider subject is then resolved
//! to a portal user row to obtain the tenant and role server-side.

use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

use labportal_shared::TenantId;

/// Verification results are cached this long.
const SESSION_CACHE_TTL: Duration = Duration::from_secs(60);

/// Bounded cache: oldest entry is evicted at capacity so unique-token floods
/// cannot exhaust memory.
const MAX_CACHE_ENTRIES: usize = 10_000;

/// Session cookie set by the frontend's auth flow.
const SESSION_COOKIE: &str = "lp_auth_token";

#[derive(Clone, Debug)]
pub(crate) struct CachedIdentity {
    user: IdentityUser,
    cached_at: Instant,
}

pub type SessionCache = Arc<RwLock<HashMap<String, CachedIdentity>>>;

pub fn new_session_cache() -> SessionCache {
    Arc::new(RwLock::new(HashMap::new()))
}

/// Response from the identity provider's user endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityUser {
    pub id: String,
    pub email: Option<String>,
}

/// Role of a portal user within their practice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Staff,
}

impl Role {
    fn parse(raw: &str) -> Role {
        match raw {
            "admin" => Role::Admin,
            _ => Role::Staff,
        }
    }
}

/// The authenticated portal user for the current request.
///
/// `practice_id` is derived from the session, never from client input, and
/// is threaded explicitly into every tenant-scoped query.
#[derive(Debug, Clone)]
pub struct PortalUser {
    pub user_id: Uuid,
    pub practice_id: TenantId,
    pub role: Role,
    pub email: String,
}

/// State needed to resolve sessions.
#[derive(Clone)]
pub struct AuthState {
    pub pool: PgPool,
    pub identity_url: String,
    pub identity_anon_key: String,
    pub http_client: reqwest::Client,
    pub(crate) session_cache: SessionCache,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Authentication required")]
    MissingSession,
    #[error("Invalid or expired session")]
    InvalidSession,
    #[error("No practice linked to this account")]
    PracticeNotLinked,
    #[error("Database error")]
    DatabaseError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AuthError::MissingSession => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InvalidSession => (StatusCode::UNAUTHORIZED, "Invalid or expired session"),
            AuthError::PracticeNotLinked => (
                StatusCode::FORBIDDEN,
                "No practice linked to this account",
            ),
            AuthError::DatabaseError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = Json(json!({
            "error": message,
            "code": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

/// Extract the session token from the HttpOnly cookie or bearer header.
/// Prefers the Authorization header for API clients.
pub fn extract_session_token<B>(request: &Request<B>) -> Option<String> {
    if let Some(header) = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        if let Some(token) = header.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }

    request
        .headers()
        .get(COOKIE)
        .and_then(|h| h.to_str().ok())
        .and_then(|cookies| {
            cookies.split(';').find_map(|cookie| {
                cookie
                    .trim()
                    .strip_prefix(SESSION_COOKIE)
                    .and_then(|rest| rest.strip_prefix('='))
                    .map(String::from)
            })
        })
}

/// Resolve a session token to the authenticated portal user.
pub async fn resolve_session(state: &AuthState, token: &str) -> Result<PortalUser, AuthError> {
    let identity = verify_session_token(state, token).await?;

    let auth_user_id =
        Uuid::parse_str(&identity.id).map_err(|_| AuthError::InvalidSession)?;

    resolve_portal_user(&state.pool, auth_user_id, identity.email).await
}

/// Verify a token against the identity provider, with caching.
async fn verify_session_token(
    state: &AuthState,
    token: &str,
) -> Result<IdentityUser, AuthError> {
    {
        let cache = state.session_cache.read().await;
        if let Some(cached) = cache.get(token) {
            if cached.cached_at.elapsed() < SESSION_CACHE_TTL {
                return Ok(cached.user.clone());
            }
        }
    }

    let user = verify_token_api_call(state, token).await?;

    let mut cache = state.session_cache.write().await;
    if cache.len() >= MAX_CACHE_ENTRIES {
        if let Some(oldest_key) = cache
            .iter()
            .min_by_key(|(_, v)| v.cached_at)
            .map(|(k, _)| k.clone())
        {
            cache.remove(&oldest_key);
        }
    }
    cache.insert(
        token.to_string(),
        CachedIdentity {
            user: user.clone(),
            cached_at: Instant::now(),
        },
    );

    Ok(user)
}

async fn verify_token_api_call(
    state: &AuthState,
    token: &str,
) -> Result<IdentityUser, AuthError> {
    let url = format!("{}/auth/v1/user", state.identity_url);

    let response = state
        .http_client
        .get(&url)
        .header("apikey", &state.identity_anon_key)
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Identity provider verification request failed");
            AuthError::InvalidSession
        })?;

    if !response.status().is_success() {
        tracing::warn!(
            status = %response.status(),
            "Identity provider rejected session token"
        );
        return Err(AuthError::InvalidSession);
    }

    response
        .json::<IdentityUser>()
        .await
        .map_err(|_| AuthError::InvalidSession)
}

#[derive(Debug, sqlx::FromRow)]
struct PortalUserRow {
    id: Uuid,
    practice_id: Uuid,
    role: String,
    email: String,
}

/// Map the identity provider subject to a portal user row. The practice id
/// obtained here is the tenant scope for the whole request.
async fn resolve_portal_user(
    pool: &PgPool,
    auth_user_id: Uuid,
    email: Option<String>,
) -> Result<PortalUser, AuthError> {
    let row: Option<PortalUserRow> = sqlx::query_as(
        "SELECT id, practice_id, role, email FROM users WHERE auth_user_id = $1",
    )
    .bind(auth_user_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "Portal user lookup failed");
        AuthError::DatabaseError
    })?;

    let row = row.ok_or_else(|| {
        tracing::warn!(auth_user_id = %auth_user_id, email = ?email, "Session valid but no portal user row");
        AuthError::PracticeNotLinked
    })?;

    Ok(PortalUser {
        user_id: row.id,
        practice_id: TenantId(row.practice_id),
        role: Role::parse(&row.role),
        email: row.email,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn auth_state(identity_url: String) -> AuthState {
        // Pool is lazy: no connection is made until a query runs, so session
        // verification tests can use a placeholder URL.
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgresql://localhost/labportal_test")
            .unwrap();
        AuthState {
            pool,
            identity_url,
            identity_anon_key: "anon-key".to_string(),
            http_client: reqwest::Client::new(),
            session_cache: new_session_cache(),
        }
    }

    #[test]
    fn bearer_header_wins_over_cookie() {
        let request = Request::builder()
            .header(AUTHORIZATION, "Bearer header-token")
            .header(COOKIE, "lp_auth_token=cookie-token")
            .body(Body::empty())
            .unwrap();

        assert_eq!(
            extract_session_token(&request),
            Some("header-token".to_string())
        );
    }

    #[test]
    fn cookie_fallback_parses_among_other_cookies() {
        let request = Request::builder()
            .header(COOKIE, "theme=dark; lp_auth_token=cookie-token; lang=en")
            .body(Body::empty())
            .unwrap();

        assert_eq!(
            extract_session_token(&request),
            Some("cookie-token".to_string())
        );
    }

    #[test]
    fn missing_credentials_yield_none() {
        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(extract_session_token(&request), None);
    }

    #[tokio::test]
    async fn valid_token_is_verified_and_cached() {
        let mut server = mockito::Server::new_async().await;
        let subject = Uuid::new_v4();
        let mock = server
            .mock("GET", "/auth/v1/user")
            .match_header("apikey", "anon-key")
            .with_status(200)
            .with_body(format!(
                r#"{{"id":"{}","email":"dr@practice.example"}}"#,
                subject
            ))
            // Expect exactly one upstream call; the second lookup is served
            // from cache.
            .expect(1)
            .create_async()
            .await;

        let state = auth_state(server.url());

        let first = verify_session_token(&state, "tok-1").await.unwrap();
        let second = verify_session_token(&state, "tok-1").await.unwrap();
        assert_eq!(first.id, subject.to_string());
        assert_eq!(second.id, subject.to_string());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_token_is_invalid_session() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/auth/v1/user")
            .with_status(401)
            .with_body(r#"{"error":"invalid token"}"#)
            .create_async()
            .await;

        let state = auth_state(server.url());
        let result = verify_session_token(&state, "bad-token").await;
        assert!(matches!(result, Err(AuthError::InvalidSession)));
    }

    #[test]
    fn role_parse_defaults_to_staff() {
        assert_eq!(Role::parse("admin"), Role::Admin);
        assert_eq!(Role::parse("staff"), Role::Staff);
        assert_eq!(Role::parse("owner"), Role::Staff);
    }
}
