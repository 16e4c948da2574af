//! Save, push, delete and status handlers.
//!
//! Push failures are recorded per record and summarised; only database
//! and configuration problems abort a command.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use plansync_core::{
    load_sync_policy, AddressPayload, CustomerPayload, EntityType, InventoryLevelPayload,
    ProductPayload, SellingPlanGroupPayload, StoredPayload, SyncPayload, SyncPolicy,
};
use plansync_shopify::{ShopifyClient, ShopifyClientConfig};
use plansync_sync::{DeleteOutcome, EngineConfig, SweepItem, SyncEngine};
use sqlx::PgPool;
use uuid::Uuid;

use crate::SweepArgs;

pub(crate) type Engine = SyncEngine<ShopifyClient>;

/// Counts printed after a sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct SweepSummary {
    pub selected: usize,
    pub pushed: usize,
    pub created: usize,
    pub failed: usize,
    pub transient: usize,
    pub skipped: usize,
    /// Rows that could not be turned into records or written back.
    pub storage_errors: usize,
}

impl fmt::Display for SweepSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "selected {}, pushed {} ({} created), failed {} ({} transient), skipped {}",
            self.selected, self.pushed, self.created, self.failed, self.transient, self.skipped
        )?;
        if self.storage_errors > 0 {
            write!(f, ", storage errors {}", self.storage_errors)?;
        }
        Ok(())
    }
}

/// Loads the sync policy file, falling back to built-in defaults when it
/// does not exist.
pub(crate) fn load_policy(path: &Path) -> anyhow::Result<SyncPolicy> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "no sync policy file, using defaults");
        return Ok(SyncPolicy::default());
    }
    Ok(load_sync_policy(path)?)
}

pub(crate) fn build_engine(config: &plansync_core::AppConfig) -> anyhow::Result<Engine> {
    let client = ShopifyClient::new(ShopifyClientConfig::from_app_config(config))?;
    let policy = load_policy(&config.policy_path)?;
    Ok(SyncEngine::new(
        client,
        policy,
        EngineConfig::from_app_config(config),
    ))
}

/// Validates a JSON document as the entity's payload and returns the body
/// that will be stored and later pushed.
pub(crate) fn build_payload(entity_type: EntityType, raw: &str) -> anyhow::Result<serde_json::Value> {
    let body = match entity_type {
        EntityType::Customer => serde_json::from_str::<CustomerPayload>(raw)?.to_payload()?,
        EntityType::Address => serde_json::from_str::<AddressPayload>(raw)?.to_payload()?,
        EntityType::Product => serde_json::from_str::<ProductPayload>(raw)?.to_payload()?,
        EntityType::InventoryLevel => {
            serde_json::from_str::<InventoryLevelPayload>(raw)?.to_payload()?
        }
        EntityType::SellingPlan => {
            serde_json::from_str::<SellingPlanGroupPayload>(raw)?.to_payload()?
        }
    };
    Ok(body)
}

pub(crate) async fn run_save(
    pool: &PgPool,
    entity_type: EntityType,
    file: &Path,
    local_id: Option<Uuid>,
) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let payload = build_payload(entity_type, &raw)
        .with_context(|| format!("invalid {entity_type} payload in {}", file.display()))?;

    let local_id = local_id.unwrap_or_else(Uuid::new_v4);
    let saved = plansync_db::save_local(pool, entity_type, local_id, &payload).await?;

    println!(
        "{} {entity_type} {local_id}: {}{}",
        if saved.created { "created" } else { "updated" },
        saved.record.state().label(),
        if saved.changed { "" } else { " (unchanged)" },
    );
    Ok(())
}

pub(crate) async fn run_dry_run(pool: &PgPool, filter: &SweepArgs) -> anyhow::Result<()> {
    let rows =
        plansync_db::list_pending(pool, filter.entity_type, filter.only_failed, filter.limit)
            .await?;
    if rows.is_empty() {
        println!("[dry-run] nothing to push");
        return Ok(());
    }
    for row in &rows {
        let action = if row.remote_id.is_some() { "update" } else { "create" };
        match &row.last_push_error {
            Some(error) => println!(
                "[dry-run] {action} {} {} (last error: {error})",
                row.entity_type, row.local_id
            ),
            None => println!("[dry-run] {action} {} {}", row.entity_type, row.local_id),
        }
    }
    println!("[dry-run] {} record(s) would be pushed", rows.len());
    Ok(())
}

/// Rows claimed per round trip when no `--limit` is given.
const SWEEP_BATCH: i64 = 100;

/// How long a claimed batch stays hidden from other sweeps: every push in
/// the batch may hit its timeout, `max_concurrent_pushes` at a time, plus
/// one spare round.
pub(crate) fn claim_lease(config: &EngineConfig, batch: i64) -> Duration {
    let batch = u64::try_from(batch.max(1)).unwrap_or(1);
    let concurrency = u64::try_from(config.max_concurrent_pushes.max(1)).unwrap_or(u64::MAX);
    let rounds = u32::try_from(batch.div_ceil(concurrency) + 1).unwrap_or(u32::MAX);
    config.push_timeout.saturating_mul(rounds)
}

/// Claims pending records batch by batch, pushes them and writes each
/// outcome back, which also releases the claim.
///
/// With `limit` set a single batch of that size is swept. Rows written back
/// during the sweep are not claimed again, so failing records are retried on
/// the next sweep rather than in a loop.
pub(crate) async fn run_sweep(
    pool: &PgPool,
    engine: &Engine,
    filter: &SweepArgs,
) -> anyhow::Result<SweepSummary> {
    let started = Utc::now();
    let batch = filter.limit.unwrap_or(SWEEP_BATCH).max(1);
    let lease = claim_lease(engine.config(), batch);
    let mut summary = SweepSummary::default();

    loop {
        let rows = plansync_db::claim_pending(
            pool,
            filter.entity_type,
            filter.only_failed,
            batch,
            started,
            lease,
        )
        .await?;
        if rows.is_empty() {
            break;
        }
        tracing::debug!(claimed = rows.len(), "sweeping batch");
        sweep_batch(pool, engine, rows, &mut summary).await;

        if filter.limit.is_some() {
            break;
        }
    }

    Ok(summary)
}

async fn sweep_batch(
    pool: &PgPool,
    engine: &Engine,
    rows: Vec<plansync_db::SyncRecordRow>,
    summary: &mut SweepSummary,
) {
    summary.selected += rows.len();

    let mut items: Vec<SweepItem<StoredPayload>> = Vec::with_capacity(rows.len());
    for row in rows {
        match (row.to_record(), row.stored_payload()) {
            (Ok(record), Ok(payload)) => items.push(SweepItem { record, payload }),
            (Err(e), _) | (_, Err(e)) => {
                // The claim lapses on its own; the row is retried after the lease.
                tracing::error!(local_id = %row.local_id, error = %e, "skipping unreadable sync record");
                summary.storage_errors += 1;
            }
        }
    }

    let report = engine.sweep(items).await;
    summary.pushed += report.pushed;
    summary.created += report.created;
    summary.failed += report.failed;
    summary.transient += report.transient;
    summary.skipped += report.skipped;

    for (item, _) in &report.results {
        if let Err(e) = plansync_db::store_push_result(pool, &item.record, &item.payload.body).await
        {
            tracing::error!(
                local_id = %item.record.local_id(),
                error = %e,
                "failed to store push result"
            );
            summary.storage_errors += 1;
        }
    }
}

pub(crate) async fn run_delete(pool: &PgPool, engine: &Engine, local_id: Uuid) -> anyhow::Result<()> {
    let row = plansync_db::get_sync_record(pool, local_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("sync record {local_id} not found"))?;
    let record = row.to_record()?;
    let entity_type = record.entity_type();

    let outcome = engine.delete(record).await;
    plansync_db::delete_sync_record(pool, local_id).await?;

    println!("deleted {entity_type} {local_id} locally; {}", describe_delete(&outcome));
    Ok(())
}

pub(crate) fn describe_delete(outcome: &DeleteOutcome) -> String {
    match outcome {
        DeleteOutcome::RemoteDeleted { remote_id } => format!("deleted {remote_id} on Shopify"),
        DeleteOutcome::AlreadyGone { remote_id } => {
            format!("{remote_id} was already absent on Shopify")
        }
        DeleteOutcome::RemoteKept(reason) => format!("Shopify left untouched ({reason:?})"),
        DeleteOutcome::Skipped(reason) => format!("Shopify skipped ({reason:?})"),
        DeleteOutcome::RemoteDeleteFailed {
            remote_id, error, ..
        } => format!("remote delete of {remote_id} failed: {error}"),
    }
}

pub(crate) async fn run_status(pool: &PgPool) -> anyhow::Result<()> {
    let rows = plansync_db::count_by_state(pool).await?;
    if rows.is_empty() {
        println!("no sync records");
        return Ok(());
    }
    println!(
        "{:<16} {:>8} {:>8} {:>8}",
        "entity_type", "clean", "pending", "failed"
    );
    for row in rows {
        println!(
            "{:<16} {:>8} {:>8} {:>8}",
            row.entity_type, row.clean, row.pending, row.failed
        );
    }
    Ok(())
}
