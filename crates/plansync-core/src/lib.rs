pub mod app_config;
pub mod config;
pub mod discount;
pub mod entities;
pub mod policy;
pub mod remote;
pub mod sync_state;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use discount::{
    normalize, DataIntegrityError, DiscountKind, DiscountSpec, Money, NormalizedDiscount,
};
pub use entities::{
    AddressPayload, CustomerPayload, DeliveryInterval, InventoryLevelPayload, PayloadError,
    ProductPayload, SellingPlan, SellingPlanGroupPayload, StoredPayload, SyncPayload,
};
pub use policy::{load_sync_policy, parse_sync_policy, DeletionPolicy, SyncPolicy};
pub use remote::{PushRequest, RemoteError, RemoteSyncTarget};
pub use sync_state::{payload_fingerprint, EntityType, SyncRecord, SyncState};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),

    #[error("invalid sync state for {local_id}: {reason}")]
    InvalidSyncState { local_id: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read sync policy file {path}: {source}")]
    PolicyFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse sync policy file: {0}")]
    PolicyFileParse(#[from] serde_yaml::Error),

    #[error("sync policy validation failed: {0}")]
    Validation(String),
}
