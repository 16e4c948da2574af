//! GraphQL Admin API: selling plan group mutations.

use std::collections::HashSet;

use reqwest::Method;
use serde_json::{json, Map, Value};

use crate::error::ShopifyError;
use crate::ids::selling_plan_group_gid;
use crate::retry::retry_with_backoff;
use crate::types::{
    GraphqlResponse, SellingPlanGroupMutationPayload, SellingPlanGroupRef, SellingPlanRef,
    UserError,
};

use super::ShopifyClient;

const SELLING_PLAN_GROUP_CREATE: &str = r"
mutation sellingPlanGroupCreate($input: SellingPlanGroupInput!, $resources: SellingPlanGroupResourceInput) {
  sellingPlanGroupCreate(input: $input, resources: $resources) {
    sellingPlanGroup { id sellingPlans(first: 100) { edges { node { id name } } } }
    userErrors { field message code }
  }
}";

const SELLING_PLAN_GROUP_UPDATE: &str = r"
mutation sellingPlanGroupUpdate($id: ID!, $input: SellingPlanGroupInput!) {
  sellingPlanGroupUpdate(id: $id, input: $input) {
    sellingPlanGroup { id sellingPlans(first: 100) { edges { node { id name } } } }
    userErrors { field message code }
  }
}";

const SELLING_PLAN_GROUP_DELETE: &str = r"
mutation sellingPlanGroupDelete($id: ID!) {
  sellingPlanGroupDelete(id: $id) {
    deletedSellingPlanGroupId
    userErrors { field message code }
  }
}";

const SELLING_PLAN_GROUP_PLANS: &str = r"
query sellingPlanGroupPlans($id: ID!) {
  sellingPlanGroup(id: $id) {
    id
    sellingPlans(first: 100) { edges { node { id name } } }
  }
}";

const GROUP_DOES_NOT_EXIST: &str = "GROUP_DOES_NOT_EXIST";

fn join_user_errors(errors: &[UserError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn take_array(fields: &mut Map<String, Value>, key: &str) -> Vec<Value> {
    match fields.remove(key) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

/// Rewrites a group input against the plans the group already has.
///
/// A plan queued for creation whose name matches an existing plan becomes
/// an update of that plan. Existing plans with no local counterpart go to
/// `sellingPlansToDelete`: the local group wins.
fn reconcile_plans(input: &mut Value, existing: &[SellingPlanRef]) {
    let Some(fields) = input.as_object_mut() else {
        return;
    };
    let mut to_update = take_array(fields, "sellingPlansToUpdate");
    let mut claimed: HashSet<String> = to_update
        .iter()
        .filter_map(|plan| plan.get("id").and_then(Value::as_str))
        .map(str::to_owned)
        .collect();

    let mut to_create = Vec::new();
    for mut plan in take_array(fields, "sellingPlansToCreate") {
        let name = plan.get("name").and_then(Value::as_str).unwrap_or_default();
        let matched = existing
            .iter()
            .find(|remote| remote.name == name && !claimed.contains(&remote.id));
        match (matched, plan.as_object_mut()) {
            (Some(remote), Some(plan_fields)) => {
                plan_fields.insert("id".to_owned(), Value::String(remote.id.clone()));
                claimed.insert(remote.id.clone());
                to_update.push(plan);
            }
            _ => to_create.push(plan),
        }
    }

    let to_delete: Vec<Value> = existing
        .iter()
        .filter(|remote| !claimed.contains(&remote.id))
        .map(|remote| Value::String(remote.id.clone()))
        .collect();

    fields.insert("sellingPlansToCreate".to_owned(), Value::Array(to_create));
    fields.insert("sellingPlansToUpdate".to_owned(), Value::Array(to_update));
    if !to_delete.is_empty() {
        fields.insert("sellingPlansToDelete".to_owned(), Value::Array(to_delete));
    }
}

/// Pulls `data.{mutation}` out of a response and fails on `userErrors`.
fn mutation_payload(
    data: &Value,
    mutation: &str,
    target: &str,
) -> Result<SellingPlanGroupMutationPayload, ShopifyError> {
    let raw = data.get(mutation).cloned().unwrap_or(Value::Null);
    let payload: SellingPlanGroupMutationPayload =
        serde_json::from_value(raw).map_err(|e| ShopifyError::Deserialize {
            context: format!("{mutation} response"),
            source: e,
        })?;

    if payload
        .user_errors
        .iter()
        .any(|e| e.code.as_deref() == Some(GROUP_DOES_NOT_EXIST))
    {
        return Err(ShopifyError::NotFound {
            url: target.to_owned(),
        });
    }
    if !payload.user_errors.is_empty() {
        return Err(ShopifyError::UserErrors(join_user_errors(&payload.user_errors)));
    }
    Ok(payload)
}

impl ShopifyClient {
    /// Posts one GraphQL document and returns its `data`.
    ///
    /// Top-level `THROTTLED` errors are retried like a 429; any other
    /// top-level error fails the call.
    pub(super) async fn graphql(&self, query: &str, variables: Value) -> Result<Value, ShopifyError> {
        let body = json!({ "query": query, "variables": variables });
        let body = &body;
        retry_with_backoff(self.max_retries, self.backoff_base_ms, move || async move {
            let raw = self
                .execute(Method::POST, "graphql.json", Some(body))
                .await?;
            let response: GraphqlResponse =
                serde_json::from_value(raw).map_err(|e| ShopifyError::Deserialize {
                    context: "GraphQL response".to_owned(),
                    source: e,
                })?;

            if !response.errors.is_empty() {
                let messages = response
                    .errors
                    .iter()
                    .map(|e| e.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; ");
                if response.errors.iter().any(|e| e.is_throttled()) {
                    return Err(ShopifyError::Throttled(messages));
                }
                return Err(ShopifyError::Graphql(messages));
            }
            response
                .data
                .ok_or_else(|| ShopifyError::Graphql("response had neither data nor errors".to_owned()))
        })
        .await
    }

    /// Plans currently attached to a group.
    async fn selling_plan_group_plans(&self, gid: &str) -> Result<Vec<SellingPlanRef>, ShopifyError> {
        let data = self
            .graphql(SELLING_PLAN_GROUP_PLANS, json!({ "id": gid }))
            .await?;
        let raw = data.get("sellingPlanGroup").cloned().unwrap_or(Value::Null);
        let group: Option<SellingPlanGroupRef> =
            serde_json::from_value(raw).map_err(|e| ShopifyError::Deserialize {
                context: "sellingPlanGroup query".to_owned(),
                source: e,
            })?;
        group
            .map(SellingPlanGroupRef::into_plans)
            .ok_or_else(|| ShopifyError::NotFound {
                url: gid.to_owned(),
            })
    }

    pub(super) async fn upsert_selling_plan_group(
        &self,
        remote_id: Option<&str>,
        payload: &Value,
    ) -> Result<String, ShopifyError> {
        let input = payload.get("input").cloned().unwrap_or(Value::Null);

        let (mutation, data, target) = match remote_id {
            None => {
                let resources = payload.get("resources").cloned().unwrap_or(Value::Null);
                let data = self
                    .graphql(
                        SELLING_PLAN_GROUP_CREATE,
                        json!({ "input": input, "resources": resources }),
                    )
                    .await?;
                ("sellingPlanGroupCreate", data, "sellingPlanGroupCreate".to_owned())
            }
            Some(id) => {
                let gid = selling_plan_group_gid(id)?;
                let existing = self.selling_plan_group_plans(&gid).await?;
                let mut input = input;
                reconcile_plans(&mut input, &existing);
                let data = self
                    .graphql(SELLING_PLAN_GROUP_UPDATE, json!({ "id": gid, "input": input }))
                    .await?;
                ("sellingPlanGroupUpdate", data, gid)
            }
        };

        let group = mutation_payload(&data, mutation, &target)?
            .selling_plan_group
            .ok_or(ShopifyError::MissingRemoteId {
                context: mutation.to_owned(),
            })?;
        let id = group.id.clone();
        tracing::debug!(remote_id = %id, plans = group.into_plans().len(), "selling plan group written");
        Ok(id)
    }

    pub(super) async fn delete_selling_plan_group(&self, remote_id: &str) -> Result<(), ShopifyError> {
        let gid = selling_plan_group_gid(remote_id)?;
        let data = self
            .graphql(SELLING_PLAN_GROUP_DELETE, json!({ "id": gid }))
            .await?;
        let payload = mutation_payload(&data, "sellingPlanGroupDelete", &gid)?;
        tracing::info!(
            remote_id = %gid,
            deleted = payload.deleted_selling_plan_group_id.as_deref().unwrap_or_default(),
            "deleted selling plan group"
        );
        Ok(())
    }
}
