//! Payment processor client
//!
//! Thin wrapper over the processor's REST API for the interactive pay flow.
//! The underlying `reqwest::Client` is constructed once at process start and
//! injected here, never lazily initialized from module state. Timeouts are
//! the HTTP client's defaults; this system performs no outbound retries.

use serde::Deserialize;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// Configuration for the payment processor integration.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    /// Secret API key for outbound calls.
    pub secret_key: String,
    /// Shared secret for inbound webhook signature verification.
    pub webhook_secret: String,
    /// API base URL; overridable for tests.
    pub api_base: String,
}

impl PaymentConfig {
    pub fn from_env() -> BillingResult<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| BillingError::Config("STRIPE_SECRET_KEY not set".to_string()))?;
        let webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET")
            .map_err(|_| BillingError::Config("STRIPE_WEBHOOK_SECRET not set".to_string()))?;
        let api_base =
            std::env::var("STRIPE_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());

        Ok(Self {
            secret_key,
            webhook_secret,
            api_base,
        })
    }
}

/// A created payment intent, as consumed by the pay flow.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
}

#[derive(Debug, Deserialize)]
struct CustomerResponse {
    id: String,
}

#[derive(Clone)]
pub struct PaymentClient {
    config: PaymentConfig,
    http: reqwest::Client,
}

impl PaymentClient {
    pub fn new(config: PaymentConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    pub fn config(&self) -> &PaymentConfig {
        &self.config
    }

    /// Create a processor customer for a practice.
    pub async fn create_customer(
        &self,
        practice_id: Uuid,
        name: &str,
        email: Option<&str>,
    ) -> BillingResult<String> {
        let mut form = vec![
            ("name".to_string(), name.to_string()),
            ("metadata[practiceId]".to_string(), practice_id.to_string()),
        ];
        if let Some(email) = email {
            form.push(("email".to_string(), email.to_string()));
        }

        let customer: CustomerResponse = self
            .post_form("/v1/customers", &form)
            .await?;

        tracing::info!(practice_id = %practice_id, customer_id = %customer.id, "Processor customer created");
        Ok(customer.id)
    }

    /// Create a payment intent for the outstanding balance of an invoice.
    ///
    /// The invoice id travels in intent metadata under `invoiceId`; the
    /// webhook extractor reads the same key back out for reconciliation.
    pub async fn create_payment_intent(
        &self,
        amount_minor: i64,
        customer_id: &str,
        invoice_id: Uuid,
        description: &str,
    ) -> BillingResult<PaymentIntent> {
        let form = vec![
            ("amount".to_string(), amount_minor.to_string()),
            ("currency".to_string(), "usd".to_string()),
            ("customer".to_string(), customer_id.to_string()),
            ("description".to_string(), description.to_string()),
            ("metadata[invoiceId]".to_string(), invoice_id.to_string()),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];

        let intent: PaymentIntent = self.post_form("/v1/payment_intents", &form).await?;

        tracing::info!(
            invoice_id = %invoice_id,
            payment_intent_id = %intent.id,
            amount_minor,
            "Payment intent created"
        );
        Ok(intent)
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> BillingResult<T> {
        let url = format!("{}{}", self.config.api_base, path);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.secret_key)
            .form(form)
            .send()
            .await
            .map_err(|e| BillingError::Provider(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(path = %path, status = %status, body = %body, "Payment provider call failed");
            return Err(BillingError::Provider(format!(
                "{} returned {}",
                path, status
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| BillingError::Provider(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn test_config(api_base: String) -> PaymentConfig {
        PaymentConfig {
            secret_key: "sk_test_123".to_string(),
            webhook_secret: "whsec_test".to_string(),
            api_base,
        }
    }

    #[tokio::test]
    async fn create_payment_intent_parses_response() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/payment_intents")
            .match_header("authorization", "Bearer sk_test_123")
            .with_status(200)
            .with_body(r#"{"id":"pi_42","client_secret":"pi_42_secret_abc"}"#)
            .create_async()
            .await;

        let client = PaymentClient::new(test_config(server.url()), reqwest::Client::new());
        let intent = client
            .create_payment_intent(85000, "cus_1", Uuid::new_v4(), "Payment for Invoice INV-001")
            .await
            .unwrap();

        assert_eq!(intent.id, "pi_42");
        assert_eq!(intent.client_secret, "pi_42_secret_abc");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn provider_error_status_maps_to_provider_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/payment_intents")
            .with_status(402)
            .with_body(r#"{"error":{"message":"Your card was declined."}}"#)
            .create_async()
            .await;

        let client = PaymentClient::new(test_config(server.url()), reqwest::Client::new());
        let result = client
            .create_payment_intent(100, "cus_1", Uuid::new_v4(), "desc")
            .await;

        assert!(matches!(result, Err(BillingError::Provider(_))));
    }

    #[tokio::test]
    async fn create_customer_returns_id() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/customers")
            .with_status(200)
            .with_body(r#"{"id":"cus_99"}"#)
            .create_async()
            .await;

        let client = PaymentClient::new(test_config(server.url()), reqwest::Client::new());
        let id = client
            .create_customer(Uuid::new_v4(), "Bright Smile Dental", Some("billing@example.com"))
            .await
            .unwrap();

        assert_eq!(id, "cus_99");
    }
}
