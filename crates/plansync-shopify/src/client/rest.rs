//! REST Admin API writes: customers, addresses, products, inventory levels.

use plansync_core::EntityType;
use reqwest::Method;
use serde_json::{json, Map, Value};

use crate::error::ShopifyError;
use crate::ids::{composite_id, id_from_json, rest_id, split_composite};

use super::ShopifyClient;

/// Resource key used both to wrap the request and to find the object in
/// the response, plus the collection path.
fn resource(entity_type: EntityType) -> (&'static str, &'static str) {
    match entity_type {
        EntityType::Customer => ("customer", "customers"),
        EntityType::Address => ("address", "addresses"),
        EntityType::Product => ("product", "products"),
        EntityType::InventoryLevel => ("inventory_level", "inventory_levels"),
        EntityType::SellingPlan => ("selling_plan_group", "selling_plan_groups"),
    }
}

fn required_id(
    payload: &Value,
    entity_type: EntityType,
    field: &'static str,
) -> Result<String, ShopifyError> {
    let raw = payload
        .get(field)
        .and_then(id_from_json)
        .ok_or(ShopifyError::MissingField { entity_type, field })?;
    rest_id(entity_type, &raw)
}

fn numeric(id: &str) -> Result<u64, ShopifyError> {
    id.parse().map_err(|_| ShopifyError::InvalidRemoteId {
        entity_type: EntityType::InventoryLevel,
        remote_id: id.to_owned(),
    })
}

fn response_id(body: &Value, keys: &[&str], context: &str) -> Result<String, ShopifyError> {
    keys.iter()
        .find_map(|key| body.get(*key).and_then(|obj| obj.get("id")).and_then(id_from_json))
        .ok_or_else(|| ShopifyError::MissingRemoteId {
            context: context.to_owned(),
        })
}

impl ShopifyClient {
    /// `POST {collection}.json` or `PUT {collection}/{id}.json` for
    /// top-level resources (customers, products).
    pub(super) async fn upsert_resource(
        &self,
        entity_type: EntityType,
        remote_id: Option<&str>,
        payload: &Value,
    ) -> Result<String, ShopifyError> {
        let (key, collection) = resource(entity_type);
        let mut wrapped = Map::new();
        wrapped.insert(key.to_owned(), payload.clone());
        let body = Value::Object(wrapped);

        let (method, path) = match remote_id {
            None => (Method::POST, format!("{collection}.json")),
            Some(id) => (
                Method::PUT,
                format!("{collection}/{}.json", rest_id(entity_type, id)?),
            ),
        };
        let response = self.send_json(method, &path, Some(&body)).await?;
        response_id(&response, &[key], &path)
    }

    /// Addresses live under their customer. The remote id is the composite
    /// `"{customer_id}:{address_id}"`; a bare address id is accepted on
    /// update when the payload names the customer.
    pub(super) async fn upsert_address(
        &self,
        remote_id: Option<&str>,
        payload: &Value,
    ) -> Result<String, ShopifyError> {
        let payload_customer = required_id(payload, EntityType::Address, "customer_id");

        let (customer_id, address_id) = match remote_id {
            None => (payload_customer?, None),
            Some(id) => match split_composite(EntityType::Address, id) {
                Ok((customer, address)) => (customer, Some(address)),
                Err(composite_err) => match payload_customer {
                    Ok(customer) => (
                        customer,
                        Some(rest_id(EntityType::Address, id).map_err(|_| composite_err)?),
                    ),
                    Err(_) => return Err(composite_err),
                },
            },
        };

        let mut address = payload.clone();
        if let Some(map) = address.as_object_mut() {
            map.remove("customer_id");
        }
        let body = json!({ "address": address });

        let (method, path) = match &address_id {
            None => (
                Method::POST,
                format!("customers/{customer_id}/addresses.json"),
            ),
            Some(address_id) => (
                Method::PUT,
                format!("customers/{customer_id}/addresses/{address_id}.json"),
            ),
        };
        let response = self.send_json(method, &path, Some(&body)).await?;
        let address_id = response_id(&response, &["customer_address", "address"], &path)?;
        Ok(composite_id(&customer_id, &address_id))
    }

    /// `inventory_levels/set.json` is idempotent, so create and update are
    /// the same call. The remote id is `"{inventory_item_id}:{location_id}"`.
    pub(super) async fn set_inventory_level(&self, payload: &Value) -> Result<String, ShopifyError> {
        let item = required_id(payload, EntityType::InventoryLevel, "inventory_item_id")?;
        let location = required_id(payload, EntityType::InventoryLevel, "location_id")?;
        let available = payload
            .get("available")
            .and_then(Value::as_i64)
            .ok_or(ShopifyError::MissingField {
                entity_type: EntityType::InventoryLevel,
                field: "available",
            })?;

        // Shopify expects numeric ids in this body.
        let body = json!({
            "inventory_item_id": numeric(&item)?,
            "location_id": numeric(&location)?,
            "available": available,
        });
        let response = self
            .send_json(Method::POST, "inventory_levels/set.json", Some(&body))
            .await?;

        let level = response.get("inventory_level");
        let item = level
            .and_then(|l| l.get("inventory_item_id"))
            .and_then(id_from_json)
            .unwrap_or(item);
        let location = level
            .and_then(|l| l.get("location_id"))
            .and_then(id_from_json)
            .unwrap_or(location);
        Ok(composite_id(&item, &location))
    }

    pub(super) async fn delete_rest(
        &self,
        entity_type: EntityType,
        remote_id: &str,
    ) -> Result<(), ShopifyError> {
        let path = match entity_type {
            EntityType::Address => {
                let (customer, address) = split_composite(entity_type, remote_id)?;
                format!("customers/{customer}/addresses/{address}.json")
            }
            EntityType::InventoryLevel => {
                let (item, location) = split_composite(entity_type, remote_id)?;
                format!("inventory_levels.json?inventory_item_id={item}&location_id={location}")
            }
            EntityType::Customer | EntityType::Product | EntityType::SellingPlan => {
                let (_, collection) = resource(entity_type);
                format!("{collection}/{}.json", rest_id(entity_type, remote_id)?)
            }
        };
        self.send_json(Method::DELETE, &path, None).await?;
        tracing::info!(%entity_type, remote_id, "deleted remote object");
        Ok(())
    }
}
