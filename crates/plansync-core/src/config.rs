use std::str::FromStr;

use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so tests can drive it with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let database_url = require("DATABASE_URL")?;
    let shopify_store_domain = normalize_store_domain(&require("SHOPIFY_STORE_DOMAIN")?);
    let shopify_access_token = require("SHOPIFY_ACCESS_TOKEN")?;
    let shopify_api_version = or_default("SHOPIFY_API_VERSION", "2024-10");

    let env = parse_environment(&or_default("PLANSYNC_ENV", "development"))?;
    let log_level = or_default("PLANSYNC_LOG_LEVEL", "info");
    let policy_path = PathBuf::from(or_default(
        "PLANSYNC_POLICY_PATH",
        "./config/sync_policy.yaml",
    ));

    let db_max_connections: u32 = parse_var(&lookup, "PLANSYNC_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections: u32 = parse_var(&lookup, "PLANSYNC_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs: u64 =
        parse_var(&lookup, "PLANSYNC_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    if db_min_connections > db_max_connections {
        return Err(ConfigError::InvalidEnvVar {
            var: "PLANSYNC_DB_MIN_CONNECTIONS".to_string(),
            reason: format!(
                "min connections ({db_min_connections}) exceeds max connections ({db_max_connections})"
            ),
        });
    }

    let push_timeout_secs: u64 = parse_positive(&lookup, "PLANSYNC_PUSH_TIMEOUT_SECS", "10")?;
    let delete_timeout_secs: u64 = parse_positive(&lookup, "PLANSYNC_DELETE_TIMEOUT_SECS", "5")?;
    let max_concurrent_pushes: usize =
        parse_positive(&lookup, "PLANSYNC_MAX_CONCURRENT_PUSHES", "4")?;
    let rate_limit_per_sec: u32 = parse_positive(&lookup, "PLANSYNC_RATE_LIMIT_PER_SEC", "2")?;
    let rate_limit_burst: u32 = parse_positive(&lookup, "PLANSYNC_RATE_LIMIT_BURST", "2")?;
    let http_max_retries: u32 = parse_var(&lookup, "PLANSYNC_HTTP_MAX_RETRIES", "2")?;
    let http_retry_backoff_ms: u64 = parse_var(&lookup, "PLANSYNC_HTTP_RETRY_BACKOFF_MS", "500")?;
    let user_agent = or_default("PLANSYNC_USER_AGENT", "plansync/0.1 (shopify-sync)");

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        policy_path,
        shopify_store_domain,
        shopify_access_token,
        shopify_api_version,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        push_timeout_secs,
        delete_timeout_secs,
        max_concurrent_pushes,
        rate_limit_per_sec,
        rate_limit_burst,
        http_max_retries,
        http_retry_backoff_ms,
        user_agent,
    })
}

fn parse_var<F, T>(lookup: &F, var: &str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(var).unwrap_or_else(|_| default.to_string());
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
}

/// Like [`parse_var`] but rejects zero, for timeouts, rates and pool sizes
/// where zero would stall every push.
fn parse_positive<F, T>(lookup: &F, var: &str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
    T: FromStr + Default + PartialEq,
    T::Err: std::fmt::Display,
{
    let value: T = parse_var(lookup, var, default)?;
    if value == T::default() {
        return Err(ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

/// Strips scheme and trailing slashes so `https://shop.myshopify.com/`
/// and `shop.myshopify.com` configure the same store.
fn normalize_store_domain(raw: &str) -> String {
    raw.trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_string()
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidEnvVar`] for anything other than
/// `development`, `test`, or `production`.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "PLANSYNC_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
