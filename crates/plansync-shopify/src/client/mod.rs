//! HTTP client for the Shopify Admin API.

mod graphql;
mod rest;

use std::time::Duration;

use plansync_core::{AppConfig, EntityType, PushRequest, RemoteError, RemoteSyncTarget};
use reqwest::{Client, Method};
use serde_json::Value;

use crate::error::ShopifyError;
use crate::ids::admin_base_url;
use crate::rate_limit::RateLimiter;
use crate::retry::retry_with_backoff;

const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";

/// Shopify sends `Retry-After: 2.0` on REST throttling; assume the same
/// when the header is missing.
const DEFAULT_RETRY_AFTER_SECS: f64 = 2.0;

const MIN_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);

/// Splits the engine's per-push budget across the first try and every
/// retry, so a slow first attempt still leaves room for the others.
#[must_use]
pub fn attempt_timeout(push_timeout: Duration, max_retries: u32) -> Duration {
    (push_timeout / max_retries.saturating_add(1)).max(MIN_ATTEMPT_TIMEOUT)
}

#[derive(Clone)]
pub struct ShopifyClientConfig {
    pub store_domain: String,
    pub access_token: String,
    pub api_version: String,
    /// Timeout of a single HTTP attempt, not of the whole retried call.
    pub attempt_timeout: Duration,
    pub user_agent: String,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub rate_limit_per_sec: u32,
    pub rate_limit_burst: u32,
}

impl std::fmt::Debug for ShopifyClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopifyClientConfig")
            .field("store_domain", &self.store_domain)
            .field("access_token", &"[redacted]")
            .field("api_version", &self.api_version)
            .field("attempt_timeout", &self.attempt_timeout)
            .field("user_agent", &self.user_agent)
            .field("max_retries", &self.max_retries)
            .field("backoff_base_ms", &self.backoff_base_ms)
            .field("rate_limit_per_sec", &self.rate_limit_per_sec)
            .field("rate_limit_burst", &self.rate_limit_burst)
            .finish()
    }
}

impl ShopifyClientConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            store_domain: config.shopify_store_domain.clone(),
            access_token: config.shopify_access_token.clone(),
            api_version: config.shopify_api_version.clone(),
            attempt_timeout: attempt_timeout(config.push_timeout(), config.http_max_retries),
            user_agent: config.user_agent.clone(),
            max_retries: config.http_max_retries,
            backoff_base_ms: config.http_retry_backoff_ms,
            rate_limit_per_sec: config.rate_limit_per_sec,
            rate_limit_burst: config.rate_limit_burst,
        }
    }
}

/// Writes customers, addresses, products, inventory levels and selling plan
/// groups to one Shopify store.
///
/// Every request waits on a shared [`RateLimiter`] and transient failures
/// (429, 5xx, GraphQL `THROTTLED`, network errors) are retried with
/// exponential backoff up to `max_retries` additional attempts.
pub struct ShopifyClient {
    client: Client,
    base_url: String,
    access_token: String,
    limiter: RateLimiter,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl ShopifyClient {
    /// Creates a client for `https://{store_domain}/admin/api/{api_version}/`.
    ///
    /// # Errors
    ///
    /// Returns [`ShopifyError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(config: ShopifyClientConfig) -> Result<Self, ShopifyError> {
        let base_url = admin_base_url(&config.store_domain, &config.api_version);
        Self::with_base_url(config, &base_url)
    }

    /// Creates a client against an explicit API root, e.g. a mock server.
    ///
    /// # Errors
    ///
    /// Returns [`ShopifyError::InvalidUrl`] if `base_url` does not parse, or
    /// [`ShopifyError::Http`] if the `reqwest::Client` cannot be built.
    pub fn with_base_url(config: ShopifyClientConfig, base_url: &str) -> Result<Self, ShopifyError> {
        let mut base_url = base_url.trim().to_owned();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        reqwest::Url::parse(&base_url).map_err(|e| ShopifyError::InvalidUrl {
            url: base_url.clone(),
            reason: e.to_string(),
        })?;

        let client = Client::builder()
            .timeout(config.attempt_timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(&config.user_agent)
            .build()?;
        Ok(Self {
            client,
            base_url,
            access_token: config.access_token,
            limiter: RateLimiter::new(config.rate_limit_per_sec, config.rate_limit_burst),
            max_retries: config.max_retries,
            backoff_base_ms: config.backoff_base_ms,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Sends one JSON request with retry on transient errors. Returns the
    /// decoded body, or `Value::Null` for an empty one.
    pub(super) async fn send_json(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ShopifyError> {
        retry_with_backoff(self.max_retries, self.backoff_base_ms, move || {
            self.execute(method.clone(), path, body)
        })
        .await
    }

    /// Single attempt: waits for a rate-limit token, sends, and maps the
    /// status to a typed error.
    pub(super) async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ShopifyError> {
        let url = self.url(path);
        self.limiter.acquire().await;

        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(ACCESS_TOKEN_HEADER, &self.access_token)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        tracing::debug!(%method, %url, "sending Shopify request");
        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<f64>().ok())
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(ShopifyError::RateLimited { retry_after_secs });
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ShopifyError::NotFound { url });
        }

        let text = response.text().await?;

        if status.is_server_error() {
            return Err(ShopifyError::ServerError {
                status: status.as_u16(),
                url,
                body: text,
            });
        }

        if !status.is_success() {
            return Err(ShopifyError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ShopifyError::Deserialize {
            context: format!("{method} {url}"),
            source: e,
        })
    }
}

impl RemoteSyncTarget for ShopifyClient {
    async fn create_or_update(&self, request: &PushRequest) -> Result<String, RemoteError> {
        let remote_id = request.remote_id.as_deref();
        let payload = &request.payload;
        let result = match request.entity_type {
            EntityType::Customer | EntityType::Product => {
                self.upsert_resource(request.entity_type, remote_id, payload)
                    .await
            }
            EntityType::Address => self.upsert_address(remote_id, payload).await,
            EntityType::InventoryLevel => self.set_inventory_level(payload).await,
            EntityType::SellingPlan => self.upsert_selling_plan_group(remote_id, payload).await,
        };

        match &result {
            Ok(id) => tracing::debug!(
                entity_type = %request.entity_type,
                local_id = %request.local_id,
                remote_id = %id,
                "Shopify write succeeded"
            ),
            Err(e) => tracing::warn!(
                entity_type = %request.entity_type,
                local_id = %request.local_id,
                error = %e,
                "Shopify write failed"
            ),
        }
        result.map_err(RemoteError::from)
    }

    async fn delete(&self, entity_type: EntityType, remote_id: &str) -> Result<(), RemoteError> {
        let result = match entity_type {
            EntityType::SellingPlan => self.delete_selling_plan_group(remote_id).await,
            _ => self.delete_rest(entity_type, remote_id).await,
        };
        result.map_err(RemoteError::from)
    }
}

#[cfg(test)]
#[path = "../client_test.rs"]
mod tests;
