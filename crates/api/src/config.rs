//! Server configuration from environment variables

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    /// Base URL of the identity provider that issues and refreshes sessions.
    pub identity_url: String,
    /// Public (anon) key for the identity provider's user endpoint.
    pub identity_anon_key: String,
    /// CORS origin allowlist.
    pub allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let identity_url =
            std::env::var("IDENTITY_URL").context("IDENTITY_URL must be set")?;
        let identity_anon_key =
            std::env::var("IDENTITY_ANON_KEY").context("IDENTITY_ANON_KEY must be set")?;
        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            database_url,
            bind_address,
            identity_url,
            identity_anon_key,
            allowed_origins,
        })
    }
}
