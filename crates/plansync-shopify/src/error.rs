use std::time::Duration;

use plansync_core::{EntityType, RemoteError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShopifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("rate limited by Shopify (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: f64 },

    #[error("GraphQL request throttled: {0}")]
    Throttled(String),

    #[error("endpoint not found: {url}")]
    NotFound { url: String },

    #[error("Shopify server error {status} from {url}: {body}")]
    ServerError { status: u16, url: String, body: String },

    #[error("HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("{0}")]
    UserErrors(String),

    #[error("GraphQL errors: {0}")]
    Graphql(String),

    #[error("{entity_type} payload is missing {field}")]
    MissingField {
        entity_type: EntityType,
        field: &'static str,
    },

    #[error("invalid remote id \"{remote_id}\" for {entity_type}")]
    InvalidRemoteId {
        entity_type: EntityType,
        remote_id: String,
    },

    #[error("response for {context} did not include an id")]
    MissingRemoteId { context: String },

    #[error("invalid Shopify URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl ShopifyError {
    /// Minimum wait Shopify asked for, if any.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ShopifyError::RateLimited { retry_after_secs } => {
                Duration::try_from_secs_f64(*retry_after_secs).ok()
            }
            _ => None,
        }
    }
}

impl From<ShopifyError> for RemoteError {
    fn from(err: ShopifyError) -> Self {
        match err {
            ShopifyError::Http(_)
            | ShopifyError::RateLimited { .. }
            | ShopifyError::Throttled(_)
            | ShopifyError::ServerError { .. } => RemoteError::Transient(err.to_string()),
            ShopifyError::NotFound { url } => RemoteError::NotFound(url),
            ShopifyError::Deserialize { .. }
            | ShopifyError::Rejected { .. }
            | ShopifyError::UserErrors(_)
            | ShopifyError::Graphql(_)
            | ShopifyError::MissingField { .. }
            | ShopifyError::InvalidRemoteId { .. }
            | ShopifyError::MissingRemoteId { .. }
            | ShopifyError::InvalidUrl { .. } => RemoteError::Rejected(err.to_string()),
        }
    }
}
