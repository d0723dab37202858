//! Stripe client wrapper and configuration

use crate::error::{BillingError, BillingResult};

/// Price identifiers for each plan/interval pair, loaded from the environment.
#[derive(Debug, Clone, Default)]
pub struct PriceIds {
    pub basic_monthly: String,
    pub basic_annual: String,
    pub pro_monthly: String,
    pub pro_annual: String,
    pub enterprise_monthly: String,
    pub enterprise_annual: String,
}

impl PriceIds {
    pub fn from_env() -> BillingResult<Self> {
        Ok(Self {
            basic_monthly: require_env("STRIPE_PRICE_BASIC_MONTHLY")?,
            basic_annual: require_env("STRIPE_PRICE_BASIC_ANNUAL")?,
            pro_monthly: require_env("STRIPE_PRICE_PRO_MONTHLY")?,
            pro_annual: require_env("STRIPE_PRICE_PRO_ANNUAL")?,
            enterprise_monthly: require_env("STRIPE_PRICE_ENTERPRISE_MONTHLY")?,
            enterprise_annual: require_env("STRIPE_PRICE_ENTERPRISE_ANNUAL")?,
        })
    }
}

fn require_env(key: &str) -> BillingResult<String> {
    std::env::var(key)
        .map_err(|_| BillingError::Config(format!("{} not configured", key)))
        .and_then(|v| {
            if v.trim().is_empty() {
                Err(BillingError::Config(format!("{} is empty", key)))
            } else {
                Ok(v)
            }
        })
}

/// Stripe configuration
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub price_ids: PriceIds,
    /// API base URL; overridable for test harnesses pointed at a local stub.
    pub api_base: String,
}

impl StripeConfig {
    pub fn from_env() -> BillingResult<Self> {
        Ok(Self {
            secret_key: require_env("STRIPE_SECRET_KEY")?,
            price_ids: PriceIds::from_env()?,
            api_base: std::env::var("STRIPE_API_BASE")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
        })
    }
}

/// Shared Stripe client
///
/// Wraps the async-stripe client for the endpoints its 0.39 generated
/// surface covers, plus a reqwest client for the endpoints it does not
/// (subscription schedules use Stripe's nested form parameters directly).
#[derive(Clone)]
pub struct StripeClient {
    client: stripe::Client,
    http: reqwest::Client,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        let client = stripe::Client::new(config.secret_key.clone());
        Self {
            client,
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn from_env() -> BillingResult<Self> {
        Ok(Self::new(StripeConfig::from_env()?))
    }

    /// Access the underlying async-stripe client
    pub fn inner(&self) -> &stripe::Client {
        &self.client
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }

    /// POST a form-encoded request to a Stripe endpoint not covered by the
    /// typed client, returning the parsed JSON body.
    pub async fn post_form(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> BillingResult<serde_json::Value> {
        let url = format!("{}/v1/{}", self.config.api_base, path);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.secret_key)
            .form(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            tracing::error!(
                path = %path,
                status = %status,
                error_body = %error_body,
                "Stripe API call failed"
            );
            if status.is_server_error() {
                return Err(BillingError::ProviderUnavailable(format!(
                    "Stripe API error ({}): {}",
                    status, error_body
                )));
            }
            return Err(BillingError::ProviderRejected(format!(
                "Stripe API error ({}): {}",
                status, error_body
            )));
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| BillingError::ProviderRejected(format!("malformed Stripe response: {}", e)))
    }

    /// GET a Stripe endpoint not covered by the typed client.
    pub async fn get_json(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> BillingResult<serde_json::Value> {
        let url = format!("{}/v1/{}", self.config.api_base, path);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.config.secret_key)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            tracing::error!(
                path = %path,
                status = %status,
                error_body = %error_body,
                "Stripe API call failed"
            );
            if status.is_server_error() {
                return Err(BillingError::ProviderUnavailable(format!(
                    "Stripe API error ({}): {}",
                    status, error_body
                )));
            }
            return Err(BillingError::ProviderRejected(format!(
                "Stripe API error ({}): {}",
                status, error_body
            )));
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| BillingError::ProviderRejected(format!("malformed Stripe response: {}", e)))
    }
}
