use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::sync_state::EntityType;
use crate::ConfigError;

/// Patterns for remote ids that belong to test or placeholder objects.
pub const DEFAULT_PLACEHOLDER_PATTERNS: [&str; 3] = [
    r"^(?i)test[-_]",
    r"^(?i)placeholder",
    r"^gid://shopify/[A-Za-z]+/(?i:test|placeholder|mock)[-_]",
];

/// What happens on Shopify when a record is deleted locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionPolicy {
    DeleteRemote,
    KeepRemote,
}

impl DeletionPolicy {
    /// Built-in policy: catalog objects follow local deletes, customer data
    /// and stock levels stay on Shopify.
    #[must_use]
    pub fn default_for(entity_type: EntityType) -> Self {
        match entity_type {
            EntityType::Product | EntityType::SellingPlan => DeletionPolicy::DeleteRemote,
            EntityType::Customer | EntityType::Address | EntityType::InventoryLevel => {
                DeletionPolicy::KeepRemote
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncPolicy {
    deletion: HashMap<EntityType, DeletionPolicy>,
    placeholder_patterns: Vec<Regex>,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        let placeholder_patterns = DEFAULT_PLACEHOLDER_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect();
        Self {
            deletion: HashMap::new(),
            placeholder_patterns,
        }
    }
}

impl SyncPolicy {
    #[must_use]
    pub fn deletion_policy(&self, entity_type: EntityType) -> DeletionPolicy {
        self.deletion
            .get(&entity_type)
            .copied()
            .unwrap_or_else(|| DeletionPolicy::default_for(entity_type))
    }

    #[must_use]
    pub fn with_deletion_policy(mut self, entity_type: EntityType, policy: DeletionPolicy) -> Self {
        self.deletion.insert(entity_type, policy);
        self
    }

    /// `true` if `remote_id` names a test/placeholder object that must never
    /// be pushed to or deleted from the live store.
    #[must_use]
    pub fn is_placeholder(&self, remote_id: &str) -> bool {
        self.placeholder_patterns
            .iter()
            .any(|re| re.is_match(remote_id))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SyncPolicyFile {
    #[serde(default)]
    pub entities: BTreeMap<EntityType, EntityPolicyConfig>,
    /// Replaces the built-in patterns when present.
    pub placeholder_patterns: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct EntityPolicyConfig {
    pub delete_remote: Option<bool>,
}

/// Load and validate the sync policy from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read or parsed, or a
/// placeholder pattern is not a valid regex.
pub fn load_sync_policy(path: &Path) -> Result<SyncPolicy, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::PolicyFileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_sync_policy(&content)
}

/// Parse a sync policy document.
///
/// # Errors
///
/// See [`load_sync_policy`].
pub fn parse_sync_policy(content: &str) -> Result<SyncPolicy, ConfigError> {
    let file: SyncPolicyFile = serde_yaml::from_str(content)?;
    build_policy(file)
}

fn build_policy(file: SyncPolicyFile) -> Result<SyncPolicy, ConfigError> {
    let mut policy = SyncPolicy::default();

    for (entity_type, cfg) in file.entities {
        if let Some(delete_remote) = cfg.delete_remote {
            let p = if delete_remote {
                DeletionPolicy::DeleteRemote
            } else {
                DeletionPolicy::KeepRemote
            };
            policy.deletion.insert(entity_type, p);
        }
    }

    if let Some(patterns) = file.placeholder_patterns {
        policy.placeholder_patterns = patterns
            .iter()
            .map(|p| {
                if p.trim().is_empty() {
                    return Err(ConfigError::Validation(
                        "placeholder pattern must be non-empty".to_string(),
                    ));
                }
                Regex::new(p).map_err(|e| {
                    ConfigError::Validation(format!("invalid placeholder pattern '{p}': {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
    }

    Ok(policy)
}
