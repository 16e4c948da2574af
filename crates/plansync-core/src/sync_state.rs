//! Push-state tracking for locally-owned records mirrored to Shopify.
//!
//! ```text
//!            new()
//!              │
//!              ▼
//!   ┌──── PendingPush ◄──── mark_dirty() ──── Clean
//!   │          │                                ▲
//!   │  record_failure()                         │
//!   │          ▼                                │
//!   │       Failed ───── record_success() ──────┤
//!   │          ▲  └─ record_failure() ─┘        │
//!   └──────────┴───── record_success() ─────────┘
//! ```
//!
//! `needs_push` and `last_push_error` are derived from [`SyncState`], so a
//! clean record can never carry a stale error and a failed one can never
//! lose its retry eligibility.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::CoreError;

/// Kinds of records pushed to Shopify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Customer,
    Address,
    Product,
    InventoryLevel,
    SellingPlan,
}

impl EntityType {
    pub const ALL: [EntityType; 5] = [
        EntityType::Customer,
        EntityType::Address,
        EntityType::Product,
        EntityType::InventoryLevel,
        EntityType::SellingPlan,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Customer => "customer",
            EntityType::Address => "address",
            EntityType::Product => "product",
            EntityType::InventoryLevel => "inventory_level",
            EntityType::SellingPlan => "selling_plan",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        EntityType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| CoreError::UnknownEntityType(s.to_owned()))
    }
}

/// Where a record stands relative to its Shopify counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncState {
    Clean,
    PendingPush,
    Failed { error: String },
}

impl SyncState {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            SyncState::Clean => "clean",
            SyncState::PendingPush => "pending_push",
            SyncState::Failed { .. } => "failed",
        }
    }
}

/// Sync bookkeeping embedded in a domain record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRecord {
    local_id: Uuid,
    entity_type: EntityType,
    remote_id: Option<String>,
    state: SyncState,
    last_pushed_at: Option<DateTime<Utc>>,
    payload_fingerprint: Option<String>,
}

impl SyncRecord {
    /// A freshly created record. It has no remote counterpart yet, so it
    /// always owes an initial push.
    #[must_use]
    pub fn new(entity_type: EntityType, local_id: Uuid) -> Self {
        Self {
            local_id,
            entity_type,
            remote_id: None,
            state: SyncState::PendingPush,
            last_pushed_at: None,
            payload_fingerprint: None,
        }
    }

    /// Rebuilds a record from its persisted columns.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidSyncState`] when the columns describe a
    /// record that is clean yet still carries an error.
    pub fn from_parts(
        entity_type: EntityType,
        local_id: Uuid,
        remote_id: Option<String>,
        needs_push: bool,
        last_push_error: Option<String>,
        last_pushed_at: Option<DateTime<Utc>>,
        payload_fingerprint: Option<String>,
    ) -> Result<Self, CoreError> {
        let state = match (needs_push, last_push_error) {
            (false, None) => SyncState::Clean,
            (false, Some(error)) => {
                return Err(CoreError::InvalidSyncState {
                    local_id: local_id.to_string(),
                    reason: format!("clean record carries push error \"{error}\""),
                })
            }
            (true, None) => SyncState::PendingPush,
            (true, Some(error)) => SyncState::Failed { error },
        };
        Ok(Self {
            local_id,
            entity_type,
            remote_id,
            state,
            last_pushed_at,
            payload_fingerprint,
        })
    }

    #[must_use]
    pub fn local_id(&self) -> Uuid {
        self.local_id
    }

    #[must_use]
    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    #[must_use]
    pub fn remote_id(&self) -> Option<&str> {
        self.remote_id.as_deref()
    }

    #[must_use]
    pub fn state(&self) -> &SyncState {
        &self.state
    }

    #[must_use]
    pub fn needs_push(&self) -> bool {
        !matches!(self.state, SyncState::Clean)
    }

    #[must_use]
    pub fn last_push_error(&self) -> Option<&str> {
        match &self.state {
            SyncState::Failed { error } => Some(error),
            _ => None,
        }
    }

    #[must_use]
    pub fn last_pushed_at(&self) -> Option<DateTime<Utc>> {
        self.last_pushed_at
    }

    #[must_use]
    pub fn payload_fingerprint(&self) -> Option<&str> {
        self.payload_fingerprint.as_deref()
    }

    /// A synced field changed locally.
    ///
    /// Clean records reopen as pending; pending and failed records already
    /// owe a push and keep their state (a failed record keeps its error until
    /// the next attempt reports).
    pub fn mark_dirty(&mut self) {
        if self.state == SyncState::Clean {
            self.state = SyncState::PendingPush;
        }
    }

    /// Compares `payload` with what was last pushed and marks the record
    /// dirty if it differs. Returns `true` when the payload changed.
    pub fn observe_payload(&mut self, payload: &serde_json::Value) -> bool {
        let fingerprint = payload_fingerprint(payload);
        let changed = self.payload_fingerprint.as_deref() != Some(fingerprint.as_str());
        if changed {
            self.mark_dirty();
        }
        changed
    }

    /// A push was confirmed by Shopify.
    pub fn record_success(
        &mut self,
        remote_id: String,
        fingerprint: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.remote_id = Some(remote_id);
        self.state = SyncState::Clean;
        self.last_pushed_at = Some(now);
        if fingerprint.is_some() {
            self.payload_fingerprint = fingerprint;
        }
    }

    /// A push attempt failed; the message is kept verbatim.
    pub fn record_failure(&mut self, message: impl Into<String>) {
        self.state = SyncState::Failed {
            error: message.into(),
        };
    }
}

/// SHA-256 hex digest of a payload's JSON encoding.
///
/// `serde_json` keeps object keys sorted unless `preserve_order` is enabled,
/// so logically equal payloads hash identically.
#[must_use]
pub fn payload_fingerprint(payload: &serde_json::Value) -> String {
    let digest = Sha256::digest(payload.to_string().as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
