//! Shopify Admin API response shapes.
//!
//! REST responses wrap the written object under its resource key
//! (`{"customer": {"id": 207119551, ...}}`); only the id is read back, so
//! those bodies stay as `serde_json::Value`. GraphQL responses are typed
//! down to the mutation payload.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct GraphqlResponse {
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
pub struct GraphqlError {
    pub message: String,
    pub extensions: Option<GraphqlErrorExtensions>,
}

impl GraphqlError {
    #[must_use]
    pub fn is_throttled(&self) -> bool {
        self.extensions
            .as_ref()
            .and_then(|e| e.code.as_deref())
            .is_some_and(|code| code == "THROTTLED")
    }
}

#[derive(Debug, Deserialize)]
pub struct GraphqlErrorExtensions {
    pub code: Option<String>,
}

/// `userErrors` entry returned by every Admin API mutation.
#[derive(Debug, Deserialize)]
pub struct UserError {
    /// Path to the offending input field, e.g. `["input", "name"]`.
    pub field: Option<Vec<String>>,
    pub message: String,
    pub code: Option<String>,
}

impl std::fmt::Display for UserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.field {
            Some(path) if !path.is_empty() => write!(f, "{}: {}", path.join("."), self.message),
            _ => f.write_str(&self.message),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SellingPlanGroupMutationPayload {
    pub selling_plan_group: Option<SellingPlanGroupRef>,
    pub deleted_selling_plan_group_id: Option<String>,
    #[serde(default)]
    pub user_errors: Vec<UserError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SellingPlanGroupRef {
    pub id: String,
    #[serde(default)]
    pub selling_plans: Option<SellingPlanConnection>,
}

impl SellingPlanGroupRef {
    #[must_use]
    pub fn into_plans(self) -> Vec<SellingPlanRef> {
        self.selling_plans
            .map(|connection| connection.edges.into_iter().map(|edge| edge.node).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
pub struct SellingPlanConnection {
    #[serde(default)]
    pub edges: Vec<SellingPlanEdge>,
}

#[derive(Debug, Deserialize)]
pub struct SellingPlanEdge {
    pub node: SellingPlanRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SellingPlanRef {
    pub id: String,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_error_display_includes_field_path() {
        let err = UserError {
            field: Some(vec!["input".to_owned(), "name".to_owned()]),
            message: "Name can't be blank".to_owned(),
            code: Some("BLANK".to_owned()),
        };
        assert_eq!(err.to_string(), "input.name: Name can't be blank");
    }

    #[test]
    fn throttled_error_detection() {
        let resp: GraphqlResponse = serde_json::from_str(
            r#"{"errors":[{"message":"Throttled","extensions":{"code":"THROTTLED"}}]}"#,
        )
        .unwrap();
        assert!(resp.data.is_none());
        assert!(resp.errors[0].is_throttled());
    }

    #[test]
    fn mutation_payload_parses_camel_case() {
        let payload: SellingPlanGroupMutationPayload = serde_json::from_str(
            r#"{"sellingPlanGroup":{"id":"gid://shopify/SellingPlanGroup/1"},"userErrors":[]}"#,
        )
        .unwrap();
        assert_eq!(
            payload.selling_plan_group.unwrap().id,
            "gid://shopify/SellingPlanGroup/1"
        );
        assert!(payload.user_errors.is_empty());
    }
}
