//! Live integration tests for plansync-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness; they need `DATABASE_URL` and run with
//! `cargo test -- --ignored`.

use std::time::Duration;

use chrono::Utc;
use plansync_core::{EntityType, SyncState};
use plansync_db::{
    claim_pending, count_by_state, delete_sync_record, get_sync_record, list_pending, save_local,
    store_push_result, DbError, StateCountRow,
};
use serde_json::json;
use uuid::Uuid;

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a live Postgres via DATABASE_URL"]
async fn first_save_creates_pending_record(pool: sqlx::PgPool) {
    let id = Uuid::new_v4();
    let saved = save_local(&pool, EntityType::Product, id, &json!({"title": "Coffee"}))
        .await
        .expect("save_local failed");

    assert!(saved.created);
    assert_eq!(saved.record.state(), &SyncState::PendingPush);

    let row = get_sync_record(&pool, id)
        .await
        .expect("get_sync_record failed")
        .expect("row should exist");
    assert!(row.needs_push);
    assert_eq!(row.entity_type, "product");
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a live Postgres via DATABASE_URL"]
async fn push_result_then_unchanged_save_stays_clean(pool: sqlx::PgPool) {
    let id = Uuid::new_v4();
    let payload = json!({"title": "Coffee"});
    let mut record = save_local(&pool, EntityType::Product, id, &payload)
        .await
        .unwrap()
        .record;

    record.record_success(
        "632910392".to_owned(),
        Some(plansync_core::payload_fingerprint(&payload)),
        Utc::now(),
    );
    store_push_result(&pool, &record, &payload).await.unwrap();

    let again = save_local(&pool, EntityType::Product, id, &payload)
        .await
        .unwrap();
    assert!(!again.changed);
    assert_eq!(again.record.state(), &SyncState::Clean);

    let edited = save_local(&pool, EntityType::Product, id, &json!({"title": "Beans"}))
        .await
        .unwrap();
    assert!(edited.changed);
    assert_eq!(edited.record.state(), &SyncState::PendingPush);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a live Postgres via DATABASE_URL"]
async fn save_during_push_keeps_record_pending(pool: sqlx::PgPool) {
    let id = Uuid::new_v4();
    let pushed = json!({"title": "Coffee"});
    let mut record = save_local(&pool, EntityType::Product, id, &pushed)
        .await
        .unwrap()
        .record;

    save_local(&pool, EntityType::Product, id, &json!({"title": "Newer"}))
        .await
        .unwrap();

    record.record_success("1".to_owned(), None, Utc::now());
    store_push_result(&pool, &record, &pushed).await.unwrap();

    let row = get_sync_record(&pool, id).await.unwrap().unwrap();
    assert!(row.needs_push, "newer local save must still be pushed");
    assert!(row.last_push_error.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a live Postgres via DATABASE_URL"]
async fn list_pending_filters_and_counts(pool: sqlx::PgPool) {
    let ok = Uuid::new_v4();
    let bad = Uuid::new_v4();
    save_local(&pool, EntityType::Customer, ok, &json!({"email": "a@example.com"}))
        .await
        .unwrap();
    let mut failed = save_local(&pool, EntityType::Customer, bad, &json!({"email": "b@example.com"}))
        .await
        .unwrap()
        .record;
    failed.record_failure("rejected by remote: HTTP 422");
    store_push_result(&pool, &failed, &json!({"email": "b@example.com"}))
        .await
        .unwrap();

    let all = list_pending(&pool, Some(EntityType::Customer), false, None)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let only_failed = list_pending(&pool, None, true, Some(10)).await.unwrap();
    assert_eq!(only_failed.len(), 1);
    assert_eq!(only_failed[0].local_id, bad);

    let counts = count_by_state(&pool).await.unwrap();
    assert_eq!(
        counts,
        vec![StateCountRow {
            entity_type: "customer".to_string(),
            clean: 0,
            pending: 1,
            failed: 1,
        }]
    );
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a live Postgres via DATABASE_URL"]
async fn entity_type_cannot_change(pool: sqlx::PgPool) {
    let id = Uuid::new_v4();
    save_local(&pool, EntityType::Product, id, &json!({"title": "Coffee"}))
        .await
        .unwrap();
    let err = save_local(&pool, EntityType::Customer, id, &json!({"email": "a@example.com"}))
        .await
        .expect_err("changing entity type should fail");
    assert!(matches!(err, DbError::EntityTypeMismatch { .. }));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a live Postgres via DATABASE_URL"]
async fn delete_removes_row(pool: sqlx::PgPool) {
    let id = Uuid::new_v4();
    save_local(&pool, EntityType::Address, id, &json!({"address1": "1 Main St"}))
        .await
        .unwrap();
    assert!(delete_sync_record(&pool, id).await.unwrap());
    assert!(!delete_sync_record(&pool, id).await.unwrap());
    assert!(get_sync_record(&pool, id).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a live Postgres via DATABASE_URL"]
async fn claimed_rows_are_hidden_until_released(pool: sqlx::PgPool) {
    let id = Uuid::new_v4();
    let payload = json!({"title": "Coffee"});
    save_local(&pool, EntityType::Product, id, &payload)
        .await
        .unwrap();
    let later = Utc::now() + chrono::Duration::minutes(1);
    let lease = Duration::from_secs(600);

    let first = claim_pending(&pool, None, false, 10, later, lease).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].local_id, id);

    let second = claim_pending(&pool, None, false, 10, later, lease).await.unwrap();
    assert!(second.is_empty(), "a claimed row must not be handed out twice");
    assert_eq!(list_pending(&pool, None, false, None).await.unwrap().len(), 1);

    let mut record = first[0].to_record().unwrap();
    record.record_failure("connection reset");
    store_push_result(&pool, &record, &payload).await.unwrap();

    let before_store = first[0].updated_at;
    let same_sweep = claim_pending(&pool, None, false, 10, before_store, lease)
        .await
        .unwrap();
    assert!(same_sweep.is_empty(), "rows written back are left for the next sweep");

    let next_sweep = claim_pending(&pool, None, false, 10, later, lease).await.unwrap();
    assert_eq!(next_sweep.len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a live Postgres via DATABASE_URL"]
async fn expired_claim_can_be_taken_again(pool: sqlx::PgPool) {
    let id = Uuid::new_v4();
    save_local(&pool, EntityType::Customer, id, &json!({"email": "a@example.com"}))
        .await
        .unwrap();
    let later = Utc::now() + chrono::Duration::minutes(1);

    let first = claim_pending(&pool, None, false, 10, later, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(first.len(), 1);

    tokio::time::sleep(Duration::from_millis(20)).await;
    let again = claim_pending(&pool, None, false, 10, later, Duration::from_secs(600))
        .await
        .unwrap();
    assert_eq!(again.len(), 1);
}
