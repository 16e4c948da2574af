//! The remote system records are pushed to.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::sync_state::EntityType;

/// One create-or-update call. `remote_id` decides which: absent means create.
#[derive(Debug, Clone, PartialEq)]
pub struct PushRequest {
    pub entity_type: EntityType,
    pub local_id: Uuid,
    pub remote_id: Option<String>,
    pub payload: serde_json::Value,
}

impl PushRequest {
    #[must_use]
    pub fn is_create(&self) -> bool {
        self.remote_id.is_none()
    }
}

/// Failure of a remote call. The `Display` text is what operators see in
/// `last_push_error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Validation failure or other non-retriable rejection.
    #[error("rejected by remote: {0}")]
    Rejected(String),

    /// Network failure, throttling, or a 5xx.
    #[error("transient remote failure: {0}")]
    Transient(String),

    #[error("remote call timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("remote object not found: {0}")]
    NotFound(String),
}

impl RemoteError {
    /// Transient failures may be retried sooner than rejections.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transient(_) | RemoteError::Timeout(_))
    }
}

/// A system that mirrors local records.
pub trait RemoteSyncTarget: Send + Sync {
    /// Creates the object when `request.remote_id` is `None`, updates it
    /// otherwise. Returns the remote id of the written object.
    fn create_or_update(
        &self,
        request: &PushRequest,
    ) -> impl Future<Output = Result<String, RemoteError>> + Send;

    /// Deletes a remote object. Only invoked for entity types whose
    /// [`DeletionPolicy`](crate::DeletionPolicy) allows it.
    fn delete(
        &self,
        entity_type: EntityType,
        remote_id: &str,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;
}
