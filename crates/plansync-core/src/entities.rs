//! Domain records and the payloads they push to Shopify.
//!
//! Each payload type turns a local record into the JSON body for its
//! Shopify resource. Wrapping (`{"customer": ...}`) and routing are the
//! client's concern; these types only decide which fields are sent.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::discount::{normalize, DataIntegrityError, DiscountSpec};
use crate::sync_state::EntityType;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("{entity_type} payload is missing {field}")]
    MissingField {
        entity_type: EntityType,
        field: &'static str,
    },

    #[error("selling plan \"{plan}\" has an invalid discount: {source}")]
    Discount {
        plan: String,
        #[source]
        source: DataIntegrityError,
    },

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Serializer from a domain record to the body Shopify expects.
pub trait SyncPayload {
    fn entity_type(&self) -> EntityType;

    /// # Errors
    ///
    /// Returns [`PayloadError`] when the record cannot be represented
    /// remotely (missing required field, discount failing normalization).
    fn to_payload(&self) -> Result<Value, PayloadError>;
}

/// A payload already serialized at save time, as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPayload {
    pub entity_type: EntityType,
    pub body: Value,
}

impl SyncPayload for StoredPayload {
    fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    fn to_payload(&self) -> Result<Value, PayloadError> {
        Ok(self.body.clone())
    }
}

fn put<T: Serialize>(map: &mut Map<String, Value>, key: &str, value: Option<T>) -> Result<(), PayloadError> {
    if let Some(v) = value {
        map.insert(key.to_owned(), serde_json::to_value(v)?);
    }
    Ok(())
}

fn non_empty(s: Option<&String>) -> Option<&str> {
    s.map(|v| v.trim()).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerPayload {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub note: Option<String>,
    #[serde(default)]
    pub accepts_email_marketing: bool,
}

impl SyncPayload for CustomerPayload {
    fn entity_type(&self) -> EntityType {
        EntityType::Customer
    }

    fn to_payload(&self) -> Result<Value, PayloadError> {
        let email = non_empty(self.email.as_ref());
        let phone = non_empty(self.phone.as_ref());
        if email.is_none() && phone.is_none() {
            return Err(PayloadError::MissingField {
                entity_type: EntityType::Customer,
                field: "email or phone",
            });
        }

        let mut map = Map::new();
        put(&mut map, "email", email)?;
        put(&mut map, "phone", phone)?;
        put(&mut map, "first_name", self.first_name.as_deref())?;
        put(&mut map, "last_name", self.last_name.as_deref())?;
        put(&mut map, "note", self.note.as_deref())?;
        map.insert("tags".to_owned(), Value::String(self.tags.join(", ")));
        if email.is_some() {
            let state = if self.accepts_email_marketing {
                "subscribed"
            } else {
                "not_subscribed"
            };
            map.insert(
                "email_marketing_consent".to_owned(),
                json!({ "state": state, "opt_in_level": "single_opt_in" }),
            );
        }
        Ok(Value::Object(map))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddressPayload {
    /// Shopify id of the owning customer; addresses are nested under it.
    pub customer_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub country_code: Option<String>,
    pub zip: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub default: bool,
}

impl SyncPayload for AddressPayload {
    fn entity_type(&self) -> EntityType {
        EntityType::Address
    }

    fn to_payload(&self) -> Result<Value, PayloadError> {
        let customer_id =
            non_empty(self.customer_id.as_ref()).ok_or(PayloadError::MissingField {
                entity_type: EntityType::Address,
                field: "customer_id",
            })?;
        let address1 = non_empty(self.address1.as_ref()).ok_or(PayloadError::MissingField {
            entity_type: EntityType::Address,
            field: "address1",
        })?;

        let mut map = Map::new();
        map.insert("customer_id".to_owned(), Value::String(customer_id.to_owned()));
        map.insert("address1".to_owned(), Value::String(address1.to_owned()));
        put(&mut map, "address2", self.address2.as_deref())?;
        put(&mut map, "first_name", self.first_name.as_deref())?;
        put(&mut map, "last_name", self.last_name.as_deref())?;
        put(&mut map, "company", self.company.as_deref())?;
        put(&mut map, "city", self.city.as_deref())?;
        put(&mut map, "province", self.province.as_deref())?;
        put(
            &mut map,
            "country_code",
            self.country_code.as_deref().map(str::to_ascii_uppercase),
        )?;
        put(&mut map, "zip", self.zip.as_deref())?;
        put(&mut map, "phone", self.phone.as_deref())?;
        map.insert("default".to_owned(), Value::Bool(self.default));
        Ok(Value::Object(map))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductPayload {
    pub title: String,
    pub body_html: Option<String>,
    pub vendor: Option<String>,
    pub product_type: Option<String>,
    /// `active`, `draft`, or `archived`; Shopify defaults to `active`.
    pub status: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SyncPayload for ProductPayload {
    fn entity_type(&self) -> EntityType {
        EntityType::Product
    }

    fn to_payload(&self) -> Result<Value, PayloadError> {
        if self.title.trim().is_empty() {
            return Err(PayloadError::MissingField {
                entity_type: EntityType::Product,
                field: "title",
            });
        }
        let mut map = Map::new();
        map.insert("title".to_owned(), Value::String(self.title.trim().to_owned()));
        put(&mut map, "body_html", self.body_html.as_deref())?;
        put(&mut map, "vendor", self.vendor.as_deref())?;
        put(&mut map, "product_type", self.product_type.as_deref())?;
        put(&mut map, "status", self.status.as_deref())?;
        map.insert("tags".to_owned(), Value::String(self.tags.join(", ")));
        Ok(Value::Object(map))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryLevelPayload {
    pub inventory_item_id: i64,
    pub location_id: i64,
    pub available: i64,
}

impl SyncPayload for InventoryLevelPayload {
    fn entity_type(&self) -> EntityType {
        EntityType::InventoryLevel
    }

    fn to_payload(&self) -> Result<Value, PayloadError> {
        Ok(serde_json::to_value(self)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryInterval {
    Day,
    Week,
    Month,
    Year,
}

/// One subscription option inside a selling plan group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellingPlan {
    /// Shopify id once the plan exists remotely.
    pub remote_id: Option<String>,
    pub name: String,
    /// Value shown for the group's option, e.g. `"Every 2 weeks"`.
    pub option: String,
    pub interval: DeliveryInterval,
    pub interval_count: u32,
    pub discount: Option<DiscountSpec>,
}

impl SellingPlan {
    /// Customer-facing discount label, or `None` for an undiscounted plan.
    ///
    /// # Errors
    ///
    /// Propagates [`DataIntegrityError`]; an unverifiable discount must not
    /// be rendered.
    pub fn discount_label(&self, currency_code: &str) -> Result<Option<String>, DataIntegrityError> {
        self.discount
            .as_ref()
            .map(|spec| normalize(spec).map(|n| n.label(currency_code)))
            .transpose()
    }

    fn to_input(&self) -> Result<Value, PayloadError> {
        let recurring = json!({
            "interval": self.interval,
            "intervalCount": self.interval_count,
        });
        let mut pricing_policies = Vec::new();
        if let Some(spec) = &self.discount {
            let normalized = normalize(spec).map_err(|source| PayloadError::Discount {
                plan: self.name.clone(),
                source,
            })?;
            pricing_policies.push(json!({
                "fixed": {
                    "adjustmentType": normalized.kind().as_shopify_str(),
                    "adjustmentValue": normalized.adjustment_value(),
                }
            }));
        }

        let mut input = json!({
            "name": self.name,
            "options": [self.option],
            "category": "SUBSCRIPTION",
            "billingPolicy": { "recurring": recurring.clone() },
            "deliveryPolicy": { "recurring": recurring },
            "pricingPolicies": pricing_policies,
        });
        if let (Some(id), Some(obj)) = (self.remote_id.as_ref(), input.as_object_mut()) {
            obj.insert("id".to_owned(), Value::String(id.clone()));
        }
        Ok(input)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellingPlanGroupPayload {
    pub name: String,
    pub merchant_code: Option<String>,
    /// Option names, e.g. `["Delivery every"]`.
    pub options: Vec<String>,
    /// Shopify product GIDs the group applies to.
    #[serde(default)]
    pub product_ids: Vec<String>,
    pub plans: Vec<SellingPlan>,
}

impl SyncPayload for SellingPlanGroupPayload {
    fn entity_type(&self) -> EntityType {
        EntityType::SellingPlan
    }

    /// Produces `{"input": SellingPlanGroupInput, "resources": {...}}`.
    /// Plans that already have a remote id are sent as updates.
    fn to_payload(&self) -> Result<Value, PayloadError> {
        if self.name.trim().is_empty() {
            return Err(PayloadError::MissingField {
                entity_type: EntityType::SellingPlan,
                field: "name",
            });
        }
        if self.options.is_empty() {
            return Err(PayloadError::MissingField {
                entity_type: EntityType::SellingPlan,
                field: "options",
            });
        }

        let mut to_create = Vec::new();
        let mut to_update = Vec::new();
        for plan in &self.plans {
            let input = plan.to_input()?;
            if plan.remote_id.is_some() {
                to_update.push(input);
            } else {
                to_create.push(input);
            }
        }

        let merchant_code = self
            .merchant_code
            .clone()
            .unwrap_or_else(|| self.name.trim().to_lowercase().replace(' ', "-"));

        Ok(json!({
            "input": {
                "name": self.name.trim(),
                "merchantCode": merchant_code,
                "options": self.options,
                "sellingPlansToCreate": to_create,
                "sellingPlansToUpdate": to_update,
            },
            "resources": { "productIds": self.product_ids },
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::*;
    use crate::discount::DiscountKind;

    fn monthly_plan(discount: Option<DiscountSpec>) -> SellingPlan {
        SellingPlan {
            remote_id: None,
            name: "Monthly".to_owned(),
            option: "Every month".to_owned(),
            interval: DeliveryInterval::Month,
            interval_count: 1,
            discount,
        }
    }

    fn percent(raw: &str) -> DiscountSpec {
        DiscountSpec::new(
            DiscountKind::Percentage,
            Decimal::from_str(raw).expect("valid decimal"),
        )
    }

    fn group(plans: Vec<SellingPlan>) -> SellingPlanGroupPayload {
        SellingPlanGroupPayload {
            name: "Subscribe & Save".to_owned(),
            merchant_code: None,
            options: vec!["Delivery every".to_owned()],
            product_ids: vec!["gid://shopify/Product/1".to_owned()],
            plans,
        }
    }

    #[test]
    fn customer_requires_email_or_phone() {
        let err = CustomerPayload::default().to_payload().unwrap_err();
        assert!(matches!(
            err,
            PayloadError::MissingField {
                entity_type: EntityType::Customer,
                ..
            }
        ));
    }

    #[test]
    fn customer_payload_shapes_marketing_consent() {
        let payload = CustomerPayload {
            email: Some("ada@example.com".to_owned()),
            first_name: Some("Ada".to_owned()),
            tags: vec!["vip".to_owned(), "wholesale".to_owned()],
            accepts_email_marketing: true,
            ..CustomerPayload::default()
        }
        .to_payload()
        .unwrap();
        assert_eq!(payload["email"], "ada@example.com");
        assert_eq!(payload["tags"], "vip, wholesale");
        assert_eq!(payload["email_marketing_consent"]["state"], "subscribed");
        assert!(payload.get("last_name").is_none());
    }

    #[test]
    fn phone_only_customer_has_no_email_consent() {
        let payload = CustomerPayload {
            phone: Some("+15555550100".to_owned()),
            ..CustomerPayload::default()
        }
        .to_payload()
        .unwrap();
        assert!(payload.get("email_marketing_consent").is_none());
    }

    #[test]
    fn address_requires_customer_id() {
        let err = AddressPayload {
            address1: Some("1 Main St".to_owned()),
            ..AddressPayload::default()
        }
        .to_payload()
        .unwrap_err();
        assert!(matches!(
            err,
            PayloadError::MissingField {
                field: "customer_id",
                ..
            }
        ));
    }

    #[test]
    fn address_uppercases_country_code() {
        let payload = AddressPayload {
            customer_id: Some("207119551".to_owned()),
            address1: Some("1 Main St".to_owned()),
            country_code: Some("ca".to_owned()),
            default: true,
            ..AddressPayload::default()
        }
        .to_payload()
        .unwrap();
        assert_eq!(payload["country_code"], "CA");
        assert_eq!(payload["default"], true);
    }

    #[test]
    fn product_requires_title() {
        let err = ProductPayload::default().to_payload().unwrap_err();
        assert!(err.to_string().contains("missing title"));
    }

    #[test]
    fn inventory_payload_passes_ids_through() {
        let payload = InventoryLevelPayload {
            inventory_item_id: 808_950_810,
            location_id: 655_441_491,
            available: 42,
        }
        .to_payload()
        .unwrap();
        assert_eq!(
            payload,
            json!({ "inventory_item_id": 808_950_810, "location_id": 655_441_491, "available": 42 })
        );
    }

    #[test]
    fn selling_plan_payload_carries_canonical_percent() {
        let payload = group(vec![monthly_plan(Some(percent("-10.0")))])
            .to_payload()
            .unwrap();
        let plan = &payload["input"]["sellingPlansToCreate"][0];
        assert_eq!(
            plan["pricingPolicies"][0]["fixed"]["adjustmentType"],
            "PERCENTAGE"
        );
        assert_eq!(
            plan["pricingPolicies"][0]["fixed"]["adjustmentValue"],
            json!({ "percentage": 10 })
        );
        assert_eq!(plan["billingPolicy"]["recurring"]["interval"], "MONTH");
        assert_eq!(payload["input"]["merchantCode"], "subscribe-&-save");
        assert_eq!(
            payload["resources"]["productIds"],
            json!(["gid://shopify/Product/1"])
        );
    }

    #[test]
    fn selling_plan_with_remote_id_is_an_update() {
        let mut plan = monthly_plan(None);
        plan.remote_id = Some("gid://shopify/SellingPlan/77".to_owned());
        let payload = group(vec![plan]).to_payload().unwrap();
        assert_eq!(payload["input"]["sellingPlansToCreate"], json!([]));
        assert_eq!(
            payload["input"]["sellingPlansToUpdate"][0]["id"],
            "gid://shopify/SellingPlan/77"
        );
    }

    #[test]
    fn out_of_range_discount_fails_serialization() {
        let err = group(vec![monthly_plan(Some(percent("150")))])
            .to_payload()
            .unwrap_err();
        assert!(matches!(
            err,
            PayloadError::Discount { ref plan, source: DataIntegrityError::PercentOutOfRange { .. } } if plan == "Monthly"
        ));
    }

    #[test]
    fn discount_label_for_display() {
        assert_eq!(
            monthly_plan(Some(percent("0.15"))).discount_label("USD").unwrap(),
            Some("15% off".to_owned())
        );
        assert_eq!(monthly_plan(None).discount_label("USD").unwrap(), None);
        assert!(monthly_plan(Some(percent("101"))).discount_label("USD").is_err());
    }

    #[test]
    fn stored_payload_round_trips_body() {
        let stored = StoredPayload {
            entity_type: EntityType::Product,
            body: json!({ "title": "Oat Milk" }),
        };
        assert_eq!(stored.entity_type(), EntityType::Product);
        assert_eq!(stored.to_payload().unwrap(), json!({ "title": "Oat Milk" }));
    }
}
