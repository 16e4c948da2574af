//! Cron-driven push sweeps.

use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::sync::{self, Engine};
use crate::SweepArgs;

/// Registers the sweep job, starts the scheduler and blocks until Ctrl+C.
///
/// A tick that fires while the previous sweep is still running is skipped.
pub(crate) async fn run(
    pool: PgPool,
    engine: Engine,
    cron: &str,
    filter: SweepArgs,
) -> anyhow::Result<()> {
    let mut scheduler = JobScheduler::new().await?;

    let pool = Arc::new(pool);
    let engine = Arc::new(engine);
    let filter = Arc::new(filter);
    let running = Arc::new(Mutex::new(()));

    let job = Job::new_async(cron, move |_uuid, _lock| {
        let pool = Arc::clone(&pool);
        let engine = Arc::clone(&engine);
        let filter = Arc::clone(&filter);
        let running = Arc::clone(&running);

        Box::pin(async move {
            let Ok(_guard) = running.try_lock() else {
                tracing::warn!("scheduler: previous sweep still running; skipping tick");
                return;
            };
            tracing::info!("scheduler: starting push sweep");
            match sync::run_sweep(&pool, &engine, &filter).await {
                Ok(summary) => tracing::info!(%summary, "scheduler: push sweep complete"),
                Err(e) => tracing::error!(error = %e, "scheduler: push sweep failed"),
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;
    tracing::info!(cron, "scheduler: running; press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("scheduler: shutdown signal received");
    scheduler.shutdown().await?;
    Ok(())
}
