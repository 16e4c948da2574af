use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use plansync_core::{
    payload_fingerprint, AppConfig, DeletionPolicy, PushRequest, RemoteError, RemoteSyncTarget,
    SyncPayload, SyncPolicy, SyncRecord,
};

use crate::locks::{EntityLocks, LastPush};
use crate::outcome::{DeleteOutcome, KeptReason, PushOutcome, SkipReason, SweepItem, SweepReport};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub push_timeout: Duration,
    pub delete_timeout: Duration,
    pub max_concurrent_pushes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            push_timeout: Duration::from_secs(10),
            delete_timeout: Duration::from_secs(5),
            max_concurrent_pushes: 4,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            push_timeout: config.push_timeout(),
            delete_timeout: config.delete_timeout(),
            max_concurrent_pushes: config.max_concurrent_pushes,
        }
    }
}

/// Pushes local records to a remote target.
///
/// Sync failures never escape as errors: every attempt ends in a
/// [`PushOutcome`] or [`DeleteOutcome`] and, for pushes, a state transition
/// on the record. Two pushes for the same `local_id` never overlap.
pub struct SyncEngine<T> {
    target: T,
    policy: SyncPolicy,
    config: EngineConfig,
    locks: EntityLocks,
}

impl<T: RemoteSyncTarget> SyncEngine<T> {
    #[must_use]
    pub fn new(target: T, policy: SyncPolicy, config: EngineConfig) -> Self {
        Self {
            target,
            policy,
            config,
            locks: EntityLocks::new(),
        }
    }

    #[must_use]
    pub fn target(&self) -> &T {
        &self.target
    }

    #[must_use]
    pub fn policy(&self) -> &SyncPolicy {
        &self.policy
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Pushes `record` if it owes a push.
    ///
    /// Creates the remote object when the record has no `remote_id` yet,
    /// updates it otherwise. The outcome is also applied to `record`.
    ///
    /// A push that waited behind another push of the same entity picks up
    /// the remote id that push obtained, and sends nothing if the payload is
    /// the same.
    pub async fn push<P: SyncPayload>(&self, record: &mut SyncRecord, payload: &P) -> PushOutcome {
        let local_id = record.local_id();
        let entity_type = record.entity_type();

        if let Some(remote_id) = record.remote_id() {
            if self.policy.is_placeholder(remote_id) {
                tracing::debug!(%local_id, %entity_type, remote_id, "skipping placeholder entity");
                return PushOutcome::Skipped(SkipReason::Placeholder);
            }
        }

        if !record.needs_push() {
            tracing::debug!(%local_id, %entity_type, "record is clean, nothing to push");
            return PushOutcome::Skipped(SkipReason::AlreadyClean);
        }

        if payload.entity_type() != entity_type {
            let error = format!(
                "payload is a {} but the record is a {entity_type}",
                payload.entity_type()
            );
            tracing::error!(%local_id, %entity_type, error = %error, "payload does not match record");
            record.record_failure(error.clone());
            return PushOutcome::Failed {
                error,
                transient: false,
            };
        }

        let body = match payload.to_payload() {
            Ok(body) => body,
            Err(e) => {
                let error = e.to_string();
                tracing::error!(%local_id, %entity_type, error = %error, "payload could not be built");
                record.record_failure(error.clone());
                return PushOutcome::Failed {
                    error,
                    transient: false,
                };
            }
        };

        let mut guard = self.locks.lock(local_id).await;
        let fingerprint = payload_fingerprint(&body);

        // Another push of this entity may have finished while we waited.
        let known_remote_id = match guard.last_push() {
            Some(last) if last.fingerprint == fingerprint => {
                tracing::debug!(%local_id, %entity_type, remote_id = %last.remote_id, "payload already pushed by an overlapping push");
                record.record_success(last.remote_id.clone(), Some(fingerprint), Utc::now());
                return PushOutcome::Skipped(SkipReason::PushedConcurrently);
            }
            Some(last) => Some(last.remote_id.clone()),
            None => None,
        };

        let request = PushRequest {
            entity_type,
            local_id,
            remote_id: record.remote_id().map(str::to_owned).or(known_remote_id),
            payload: body,
        };
        let timeout = self.config.push_timeout;
        let result = tokio::time::timeout(timeout, self.target.create_or_update(&request))
            .await
            .unwrap_or(Err(RemoteError::Timeout(timeout)));

        match result {
            Ok(remote_id) => {
                let created = request.is_create();
                guard.set_last_push(LastPush {
                    remote_id: remote_id.clone(),
                    fingerprint: fingerprint.clone(),
                });
                record.record_success(remote_id.clone(), Some(fingerprint), Utc::now());
                tracing::info!(%local_id, %entity_type, remote_id = %remote_id, created, "pushed to Shopify");
                PushOutcome::Pushed { remote_id, created }
            }
            Err(e) => {
                let error = e.to_string();
                let transient = e.is_transient();
                tracing::warn!(%local_id, %entity_type, error = %error, transient, "push failed");
                record.record_failure(error.clone());
                PushOutcome::Failed { error, transient }
            }
        }
    }

    /// Deletes `record` locally and, if the configured [`DeletionPolicy`] for
    /// its entity type says so, remotely.
    ///
    /// The record leaves tracking regardless of the remote result.
    pub async fn delete(&self, record: SyncRecord) -> DeleteOutcome {
        let local_id = record.local_id();
        let entity_type = record.entity_type();
        let policy = self.policy.deletion_policy(entity_type);

        if policy == DeletionPolicy::KeepRemote {
            tracing::debug!(%local_id, %entity_type, "deletion policy keeps the remote object");
            return DeleteOutcome::RemoteKept(KeptReason::Policy);
        }
        let Some(remote_id) = record.remote_id().map(str::to_owned) else {
            tracing::debug!(%local_id, %entity_type, "never pushed, nothing to delete remotely");
            return DeleteOutcome::RemoteKept(KeptReason::NeverPushed);
        };
        if self.policy.is_placeholder(&remote_id) {
            tracing::debug!(%local_id, %entity_type, remote_id = %remote_id, "skipping placeholder entity");
            return DeleteOutcome::Skipped(SkipReason::Placeholder);
        }

        let _guard = self.locks.lock(local_id).await;

        let timeout = self.config.delete_timeout;
        let result = tokio::time::timeout(timeout, self.target.delete(entity_type, &remote_id))
            .await
            .unwrap_or(Err(RemoteError::Timeout(timeout)));

        match result {
            Ok(()) => {
                tracing::info!(%local_id, %entity_type, remote_id = %remote_id, "deleted from Shopify");
                DeleteOutcome::RemoteDeleted { remote_id }
            }
            Err(RemoteError::NotFound(_)) => {
                tracing::info!(%local_id, %entity_type, remote_id = %remote_id, "already absent on Shopify");
                DeleteOutcome::AlreadyGone { remote_id }
            }
            Err(e) => {
                let error = e.to_string();
                let transient = e.is_transient();
                tracing::warn!(%local_id, %entity_type, remote_id = %remote_id, error = %error, "remote delete failed");
                DeleteOutcome::RemoteDeleteFailed {
                    remote_id,
                    error,
                    transient,
                }
            }
        }
    }

    /// Pushes every item with at most `max_concurrent_pushes` in flight.
    pub async fn sweep<P: SyncPayload>(&self, items: Vec<SweepItem<P>>) -> SweepReport<P> {
        let max_concurrent = self.config.max_concurrent_pushes.max(1);
        let total = items.len();

        let results: Vec<(SweepItem<P>, PushOutcome)> = stream::iter(items)
            .map(|mut item| async move {
                let outcome = self.push(&mut item.record, &item.payload).await;
                (item, outcome)
            })
            .buffer_unordered(max_concurrent)
            .collect()
            .await;

        let report = SweepReport::from_results(results);
        tracing::info!(
            total,
            pushed = report.pushed,
            created = report.created,
            failed = report.failed,
            transient = report.transient,
            skipped = report.skipped,
            "sweep complete"
        );
        report
    }
}
