pub mod client;
pub mod error;
pub mod ids;
pub mod rate_limit;
mod retry;
pub mod types;

pub use client::{attempt_timeout, ShopifyClient, ShopifyClientConfig};
pub use error::ShopifyError;
pub use rate_limit::RateLimiter;
