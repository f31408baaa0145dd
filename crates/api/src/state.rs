//! Application state

use sqlx::PgPool;
use std::sync::Arc;

use labportal_billing::BillingService;

use crate::auth::{new_session_cache, AuthState, SessionCache};
use crate::config::Config;

/// Shared application state, constructed once at process start.
///
/// The HTTP client is built in `main` and injected here so every outbound
/// call (identity provider, payment processor) reuses the same handle;
/// nothing initializes clients lazily from module state.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub billing: Arc<BillingService>,
    pub http_client: reqwest::Client,
    pub(crate) session_cache: SessionCache,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config, http_client: reqwest::Client) -> anyhow::Result<Self> {
        let billing = BillingService::from_env(pool.clone(), http_client.clone())?;
        tracing::info!("Billing service initialized");

        Ok(Self {
            pool,
            config,
            billing: Arc::new(billing),
            http_client,
            session_cache: new_session_cache(),
        })
    }

    /// Auth state for the session gate middleware.
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            pool: self.pool.clone(),
            identity_url: self.config.identity_url.clone(),
            identity_anon_key: self.config.identity_anon_key.clone(),
            http_client: self.http_client.clone(),
            session_cache: self.session_cache.clone(),
        }
    }
}
