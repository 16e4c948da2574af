//! Offline unit tests for plansync-db pool configuration and row types.
//! These tests do not require a live database connection.

use chrono::Utc;
use plansync_core::{AppConfig, EntityType, Environment, SyncState};
use plansync_db::{PoolConfig, StateCountRow, SyncRecordRow};
use serde_json::json;
use std::path::PathBuf;
use uuid::Uuid;

fn app_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        log_level: "info".to_string(),
        policy_path: PathBuf::from("./config/sync_policy.yaml"),
        shopify_store_domain: "plansync-dev.myshopify.com".to_string(),
        shopify_access_token: "shpat_test".to_string(),
        shopify_api_version: "2024-10".to_string(),
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        push_timeout_secs: 10,
        delete_timeout_secs: 5,
        max_concurrent_pushes: 4,
        rate_limit_per_sec: 2,
        rate_limit_burst: 2,
        http_max_retries: 2,
        http_retry_backoff_ms: 500,
        user_agent: "ua".to_string(),
    }
}

fn row(needs_push: bool, last_push_error: Option<&str>) -> SyncRecordRow {
    SyncRecordRow {
        local_id: Uuid::new_v4(),
        entity_type: "product".to_string(),
        remote_id: Some("632910392".to_string()),
        needs_push,
        last_push_error: last_push_error.map(str::to_string),
        last_pushed_at: Some(Utc::now()),
        payload: json!({"title": "Coffee"}),
        payload_fingerprint: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let pool_config = PoolConfig::from_app_config(&app_config());
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

#[test]
fn clean_row_converts_to_clean_record() {
    let row = row(false, None);
    let record = row.to_record().unwrap();
    assert_eq!(record.state(), &SyncState::Clean);
    assert_eq!(record.entity_type(), EntityType::Product);
    assert_eq!(record.remote_id(), Some("632910392"));
    assert_eq!(record.local_id(), row.local_id);
}

#[test]
fn pending_and_failed_rows_convert() {
    assert_eq!(row(true, None).to_record().unwrap().state(), &SyncState::PendingPush);
    let failed = row(true, Some("HTTP 422: title can't be blank")).to_record().unwrap();
    assert_eq!(
        failed.last_push_error(),
        Some("HTTP 422: title can't be blank")
    );
    assert!(failed.needs_push());
}

#[test]
fn clean_row_with_error_is_rejected() {
    assert!(row(false, Some("stale")).to_record().is_err());
}

#[test]
fn unknown_entity_type_is_rejected() {
    let mut row = row(true, None);
    row.entity_type = "order".to_string();
    assert!(row.to_record().is_err());
    assert!(row.stored_payload().is_err());
}

#[test]
fn stored_payload_carries_body() {
    let payload = row(true, None).stored_payload().unwrap();
    assert_eq!(payload.entity_type, EntityType::Product);
    assert_eq!(payload.body, json!({"title": "Coffee"}));
}

/// Compile-time smoke test: confirm that [`StateCountRow`] has all expected
/// fields with the correct types. No database required.
#[test]
fn state_count_row_has_expected_fields() {
    let row = StateCountRow {
        entity_type: "customer".to_string(),
        clean: 3_i64,
        pending: 1_i64,
        failed: 0_i64,
    };
    assert_eq!(row.clean + row.pending + row.failed, 4);
}
