//! Remote id and URL helpers.
//!
//! REST endpoints take numeric ids, GraphQL takes GIDs
//! (`gid://shopify/SellingPlanGroup/123`). Addresses and inventory levels
//! have no standalone id on Shopify, so their remote ids are stored as
//! composites joined with `:`.

use plansync_core::EntityType;

use crate::error::ShopifyError;

const GID_PREFIX: &str = "gid://shopify/";

/// Admin API root for a store, always ending in `/`.
#[must_use]
pub fn admin_base_url(store_domain: &str, api_version: &str) -> String {
    let domain = store_domain.trim().trim_end_matches('/');
    let domain = domain
        .strip_prefix("https://")
        .or_else(|| domain.strip_prefix("http://"))
        .unwrap_or(domain);
    format!("https://{domain}/admin/api/{api_version}/")
}

/// Extracts the numeric id from a bare id or a GID.
///
/// # Errors
///
/// Returns [`ShopifyError::InvalidRemoteId`] if the last path segment is not
/// all digits.
pub fn rest_id(entity_type: EntityType, remote_id: &str) -> Result<String, ShopifyError> {
    let tail = remote_id
        .trim()
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .split('?')
        .next()
        .unwrap_or_default();
    if !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()) {
        Ok(tail.to_owned())
    } else {
        Err(ShopifyError::InvalidRemoteId {
            entity_type,
            remote_id: remote_id.to_owned(),
        })
    }
}

/// Joins two numeric ids into a composite remote id.
#[must_use]
pub fn composite_id(first: &str, second: &str) -> String {
    format!("{first}:{second}")
}

/// Splits a composite remote id produced by [`composite_id`].
///
/// # Errors
///
/// Returns [`ShopifyError::InvalidRemoteId`] unless both halves are numeric.
pub fn split_composite(
    entity_type: EntityType,
    remote_id: &str,
) -> Result<(String, String), ShopifyError> {
    let invalid = || ShopifyError::InvalidRemoteId {
        entity_type,
        remote_id: remote_id.to_owned(),
    };
    let (first, second) = remote_id.split_once(':').ok_or_else(invalid)?;
    let first = rest_id(entity_type, first).map_err(|_| invalid())?;
    let second = rest_id(entity_type, second).map_err(|_| invalid())?;
    Ok((first, second))
}

/// Returns the selling plan group GID, promoting a bare numeric id.
///
/// # Errors
///
/// Returns [`ShopifyError::InvalidRemoteId`] for anything that is neither a
/// `SellingPlanGroup` GID nor numeric.
pub fn selling_plan_group_gid(remote_id: &str) -> Result<String, ShopifyError> {
    let trimmed = remote_id.trim();
    if trimmed.starts_with(&format!("{GID_PREFIX}SellingPlanGroup/")) {
        return Ok(trimmed.to_owned());
    }
    if trimmed.starts_with(GID_PREFIX) {
        return Err(ShopifyError::InvalidRemoteId {
            entity_type: EntityType::SellingPlan,
            remote_id: remote_id.to_owned(),
        });
    }
    let numeric = rest_id(EntityType::SellingPlan, trimmed)?;
    Ok(format!("{GID_PREFIX}SellingPlanGroup/{numeric}"))
}

/// Reads an id field that Shopify may return as a number or a string.
#[must_use]
pub fn id_from_json(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}
