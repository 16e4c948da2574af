//! Database operations for `sync_records`.
//!
//! Saving locally and pushing are separate: [`save_local`] always succeeds
//! regardless of Shopify, and [`store_push_result`] writes back whatever
//! the push engine recorded on the [`SyncRecord`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use plansync_core::{CoreError, EntityType, StoredPayload, SyncRecord};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

const SYNC_RECORD_COLUMNS: &str = "local_id, entity_type, remote_id, needs_push, \
     last_push_error, last_pushed_at, payload, payload_fingerprint, created_at, updated_at";

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `sync_records` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SyncRecordRow {
    pub local_id: Uuid,
    pub entity_type: String,
    pub remote_id: Option<String>,
    pub needs_push: bool,
    pub last_push_error: Option<String>,
    pub last_pushed_at: Option<DateTime<Utc>>,
    /// Shopify-shaped body produced when the record was saved.
    pub payload: serde_json::Value,
    pub payload_fingerprint: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncRecordRow {
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownEntityType`] for an unrecognised
    /// `entity_type` column.
    pub fn parsed_entity_type(&self) -> Result<EntityType, CoreError> {
        self.entity_type.parse()
    }

    /// Rebuilds the domain record.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError`] if the entity type is unknown or the state
    /// columns contradict each other.
    pub fn to_record(&self) -> Result<SyncRecord, CoreError> {
        SyncRecord::from_parts(
            self.parsed_entity_type()?,
            self.local_id,
            self.remote_id.clone(),
            self.needs_push,
            self.last_push_error.clone(),
            self.last_pushed_at,
            self.payload_fingerprint.clone(),
        )
    }

    /// # Errors
    ///
    /// Returns [`CoreError::UnknownEntityType`] for an unrecognised
    /// `entity_type` column.
    pub fn stored_payload(&self) -> Result<StoredPayload, CoreError> {
        Ok(StoredPayload {
            entity_type: self.parsed_entity_type()?,
            body: self.payload.clone(),
        })
    }
}

/// Per-entity-type counts returned by [`count_by_state`].
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StateCountRow {
    pub entity_type: String,
    pub clean: i64,
    pub pending: i64,
    pub failed: i64,
}

/// What [`save_local`] did.
#[derive(Debug, Clone)]
pub struct SaveResult {
    pub record: SyncRecord,
    pub created: bool,
    /// The payload differs from the last pushed one.
    pub changed: bool,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Saves a payload locally, creating the record on first save.
///
/// A new record starts as pending. An existing record is marked dirty when
/// the payload's fingerprint differs from the last pushed one; a failed
/// record keeps its error until the next push.
///
/// # Errors
///
/// Returns [`DbError::EntityTypeMismatch`] if `local_id` already belongs to
/// another entity type, [`DbError::Core`] for a corrupt stored row, or
/// [`DbError::Sqlx`] if a query fails.
pub async fn save_local(
    pool: &PgPool,
    entity_type: EntityType,
    local_id: Uuid,
    payload: &serde_json::Value,
) -> Result<SaveResult, DbError> {
    let mut tx = pool.begin().await?;

    let existing = sqlx::query_as::<_, SyncRecordRow>(&format!(
        "SELECT {SYNC_RECORD_COLUMNS} FROM sync_records WHERE local_id = $1 FOR UPDATE"
    ))
    .bind(local_id)
    .fetch_optional(&mut *tx)
    .await?;

    let (record, created, changed) = match existing {
        None => (SyncRecord::new(entity_type, local_id), true, true),
        Some(row) => {
            let mut record = row.to_record()?;
            if record.entity_type() != entity_type {
                return Err(DbError::EntityTypeMismatch {
                    local_id,
                    stored: row.entity_type,
                    requested: entity_type.to_string(),
                });
            }
            let changed = record.observe_payload(payload);
            (record, false, changed)
        }
    };

    sqlx::query(
        "INSERT INTO sync_records (local_id, entity_type, needs_push, last_push_error, payload) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (local_id) DO UPDATE \
         SET payload = EXCLUDED.payload, \
             needs_push = EXCLUDED.needs_push, \
             last_push_error = EXCLUDED.last_push_error, \
             updated_at = NOW()",
    )
    .bind(local_id)
    .bind(entity_type.as_str())
    .bind(record.needs_push())
    .bind(record.last_push_error())
    .bind(payload)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::debug!(%local_id, %entity_type, created, changed, "saved locally");
    Ok(SaveResult {
        record,
        created,
        changed,
    })
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_sync_record(
    pool: &PgPool,
    local_id: Uuid,
) -> Result<Option<SyncRecordRow>, DbError> {
    let row = sqlx::query_as::<_, SyncRecordRow>(&format!(
        "SELECT {SYNC_RECORD_COLUMNS} FROM sync_records WHERE local_id = $1"
    ))
    .bind(local_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Lists records that owe a push, oldest change first.
///
/// `only_failed` restricts the list to records whose last attempt failed.
/// `limit = None` returns every match.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_pending(
    pool: &PgPool,
    entity_type: Option<EntityType>,
    only_failed: bool,
    limit: Option<i64>,
) -> Result<Vec<SyncRecordRow>, DbError> {
    let rows = sqlx::query_as::<_, SyncRecordRow>(&format!(
        "SELECT {SYNC_RECORD_COLUMNS} FROM sync_records \
         WHERE needs_push \
           AND ($1::TEXT IS NULL OR entity_type = $1) \
           AND (NOT $2 OR last_push_error IS NOT NULL) \
         ORDER BY updated_at, local_id \
         LIMIT $3"
    ))
    .bind(entity_type.map(EntityType::as_str))
    .bind(only_failed)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Claims up to `limit` pending records for one sweep, oldest change first.
///
/// Claimed rows are hidden from other claims for `lease` or until
/// [`store_push_result`] releases them, so two sweeps never push the same
/// record at once. Only rows last changed at or before `changed_before` are
/// taken, which keeps a sweep from picking up rows it has already written
/// back.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn claim_pending(
    pool: &PgPool,
    entity_type: Option<EntityType>,
    only_failed: bool,
    limit: i64,
    changed_before: DateTime<Utc>,
    lease: Duration,
) -> Result<Vec<SyncRecordRow>, DbError> {
    let mut rows = sqlx::query_as::<_, SyncRecordRow>(&format!(
        "WITH picked AS ( \
             SELECT local_id FROM sync_records \
             WHERE needs_push \
               AND ($1::TEXT IS NULL OR entity_type = $1) \
               AND (NOT $2 OR last_push_error IS NOT NULL) \
               AND (claimed_until IS NULL OR claimed_until < NOW()) \
               AND updated_at <= $4 \
             ORDER BY updated_at, local_id \
             LIMIT $3 \
             FOR UPDATE SKIP LOCKED \
         ) \
         UPDATE sync_records \
         SET claimed_until = NOW() + make_interval(secs => $5) \
         WHERE local_id IN (SELECT local_id FROM picked) \
         RETURNING {SYNC_RECORD_COLUMNS}"
    ))
    .bind(entity_type.map(EntityType::as_str))
    .bind(only_failed)
    .bind(limit)
    .bind(changed_before)
    .bind(lease.as_secs_f64())
    .fetch_all(pool)
    .await?;

    // RETURNING does not keep the CTE's order.
    rows.sort_by(|a, b| (a.updated_at, a.local_id).cmp(&(b.updated_at, b.local_id)));
    Ok(rows)
}

/// Writes the push engine's outcome back to the row.
///
/// `pushed_payload` is the body that was sent. If the stored payload was
/// saved again while the push was in flight the row stays pending, so the
/// newer local version is pushed next. Any sweep claim on the row is
/// released.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the row no longer exists, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn store_push_result(
    pool: &PgPool,
    record: &SyncRecord,
    pushed_payload: &serde_json::Value,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE sync_records \
         SET remote_id = $2, \
             needs_push = ($3 OR payload <> $6), \
             last_push_error = $4, \
             last_pushed_at = $5, \
             payload_fingerprint = $7, \
             claimed_until = NULL, \
             updated_at = NOW() \
         WHERE local_id = $1",
    )
    .bind(record.local_id())
    .bind(record.remote_id())
    .bind(record.needs_push())
    .bind(record.last_push_error())
    .bind(record.last_pushed_at())
    .bind(pushed_payload)
    .bind(record.payload_fingerprint())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound(record.local_id()));
    }
    Ok(())
}

/// Removes a record from tracking. Returns `false` if it did not exist.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_sync_record(pool: &PgPool, local_id: Uuid) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM sync_records WHERE local_id = $1")
        .bind(local_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Counts records per entity type and sync state.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_by_state(pool: &PgPool) -> Result<Vec<StateCountRow>, DbError> {
    let rows = sqlx::query_as::<_, StateCountRow>(
        "SELECT entity_type, \
                COUNT(*) FILTER (WHERE NOT needs_push) AS clean, \
                COUNT(*) FILTER (WHERE needs_push AND last_push_error IS NULL) AS pending, \
                COUNT(*) FILTER (WHERE needs_push AND last_push_error IS NOT NULL) AS failed \
         FROM sync_records \
         GROUP BY entity_type \
         ORDER BY entity_type",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
