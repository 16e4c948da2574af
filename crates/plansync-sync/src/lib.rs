//! Push engine: moves locally saved records to a [`RemoteSyncTarget`] and
//! records each outcome on the record's sync state.
//!
//! [`RemoteSyncTarget`]: plansync_core::RemoteSyncTarget

pub mod engine;
pub mod locks;
pub mod outcome;

pub use engine::{EngineConfig, SyncEngine};
pub use locks::{EntityGuard, EntityLocks, LastPush};
pub use outcome::{DeleteOutcome, KeptReason, PushOutcome, SkipReason, SweepItem, SweepReport};
