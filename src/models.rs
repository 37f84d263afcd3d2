//! Order data model shared by every display surface.
//!
//! `Order` is the server-authoritative entity; the engine never computes
//! `total_price` or `profit` itself. Fulfillment-specific fields live on a
//! closed variant keyed by `order_type`, so delivery fields are absent from
//! dine-in orders at the type level rather than just at runtime.
//!
//! The admin backend is loose about scalar shapes (numeric strings for
//! prices, numeric ids for items, missing `order_type` on legacy dine-in
//! rows), so decoding is deliberately tolerant where the payload is and
//! strict where it matters.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::SyncError;

pub type OrderId = i64;

// ---------------------------------------------------------------------------
// Status and type enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Preparing,
    Ready,
    Served,
    OutForDelivery,
    Completed,
    Canceled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Served,
        OrderStatus::OutForDelivery,
        OrderStatus::Completed,
        OrderStatus::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::Served => "served",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::Completed => "completed",
            OrderStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    InHouse,
    Delivery,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::InHouse => "in_house",
            OrderType::Delivery => "delivery",
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Fulfillment variants
// ---------------------------------------------------------------------------

/// Per-type order fields, tagged by `order_type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "order_type", rename_all = "snake_case")]
pub enum Fulfillment {
    InHouse {
        #[serde(
            default,
            deserialize_with = "lenient::opt_string",
            skip_serializing_if = "Option::is_none"
        )]
        table_number: Option<String>,
    },
    Delivery {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delivery_address: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        customer_phone: Option<String>,
    },
}

impl Fulfillment {
    pub fn order_type(&self) -> OrderType {
        match self {
            Fulfillment::InHouse { .. } => OrderType::InHouse,
            Fulfillment::Delivery { .. } => OrderType::Delivery,
        }
    }

    pub fn table_number(&self) -> Option<&str> {
        match self {
            Fulfillment::InHouse { table_number } => table_number.as_deref(),
            Fulfillment::Delivery { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Orders and items
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    /// String so a locally created item can carry a UUID placeholder until
    /// the server assigns the real id. Numeric server ids are stringified.
    #[serde(deserialize_with = "lenient::string_from_scalar")]
    pub id: String,
    pub menu_item: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub menu_item_name: Option<String>,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Client-side draft for a new order item, before the server assigns an id.
#[derive(Debug, Clone, Serialize)]
pub struct NewOrderItem {
    pub menu_item: i64,
    #[serde(skip_serializing)]
    pub menu_item_name: Option<String>,
    pub quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    #[serde(flatten)]
    pub fulfillment: Fulfillment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    pub status: OrderStatus,
    #[serde(default, deserialize_with = "lenient::f64_from_scalar")]
    pub total_price: f64,
    #[serde(default, deserialize_with = "lenient::f64_from_scalar")]
    pub profit: f64,
    #[serde(default)]
    pub order_items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn order_type(&self) -> OrderType {
        self.fulfillment.order_type()
    }

    /// Apply a partial update to this order. Fields that belong to the
    /// other fulfillment variant are rejected before anything is touched;
    /// status legality is the transition table's job, not this one's.
    pub fn apply_patch(&mut self, patch: &OrderPatch) -> Result<(), SyncError> {
        match &self.fulfillment {
            Fulfillment::InHouse { .. } => {
                if patch.delivery_address.is_some() {
                    return Err(SyncError::FieldNotApplicable {
                        field: "delivery_address",
                        order_type: OrderType::InHouse,
                    });
                }
                if patch.customer_phone.is_some() {
                    return Err(SyncError::FieldNotApplicable {
                        field: "customer_phone",
                        order_type: OrderType::InHouse,
                    });
                }
            }
            Fulfillment::Delivery { .. } => {
                if patch.table_number.is_some() {
                    return Err(SyncError::FieldNotApplicable {
                        field: "table_number",
                        order_type: OrderType::Delivery,
                    });
                }
            }
        }

        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(name) = &patch.customer_name {
            self.customer_name = Some(name.clone());
        }
        match &mut self.fulfillment {
            Fulfillment::InHouse { table_number } => {
                if let Some(table) = &patch.table_number {
                    *table_number = Some(table.clone());
                }
            }
            Fulfillment::Delivery {
                delivery_address,
                customer_phone,
            } => {
                if let Some(address) = &patch.delivery_address {
                    *delivery_address = Some(address.clone());
                }
                if let Some(phone) = &patch.customer_phone {
                    *customer_phone = Some(phone.clone());
                }
            }
        }
        Ok(())
    }
}

/// Partial update sent as a PATCH body. Absent fields are left untouched
/// by the server, so every field is optional and skipped when `None`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrderPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,
}

impl OrderPatch {
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.customer_name.is_none()
            && self.table_number.is_none()
            && self.delivery_address.is_none()
            && self.customer_phone.is_none()
    }
}

// ---------------------------------------------------------------------------
// Lenient decoding
// ---------------------------------------------------------------------------

/// Legacy dine-in rows predate the `order_type` column and omit it.
fn normalize_order_value(value: &Value) -> Value {
    let mut value = value.clone();
    if let Value::Object(obj) = &mut value {
        if !obj.contains_key("order_type") {
            obj.insert("order_type".into(), Value::String("in_house".into()));
        }
    }
    value
}

/// Decode a single order payload.
pub fn decode_order(value: &Value) -> Result<Order, SyncError> {
    serde_json::from_value(normalize_order_value(value))
        .map_err(|e| SyncError::Decode(e.to_string()))
}

/// Decode a collection payload, dropping malformed elements instead of
/// failing the whole view. A bad row must never take a display down.
pub fn decode_orders(value: &Value) -> Vec<Order> {
    let Some(entries) = value.as_array() else {
        warn!("order collection payload is not an array, treating as empty");
        return Vec::new();
    };

    let mut orders = Vec::with_capacity(entries.len());
    for entry in entries {
        match decode_order(entry) {
            Ok(order) => orders.push(order),
            Err(e) => {
                warn!(error = %e, "dropping malformed order from collection");
            }
        }
    }
    orders
}

pub(crate) mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// Accept a JSON number or a numeric string (the backend serializes
    /// decimal columns as strings).
    pub fn f64_from_scalar<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        match &value {
            Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| serde::de::Error::custom("number out of f64 range")),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| serde::de::Error::custom(format!("not a numeric string: {s:?}"))),
            Value::Null => Ok(0.0),
            other => Err(serde::de::Error::custom(format!(
                "expected number or numeric string, got {other}"
            ))),
        }
    }

    /// Accept a string or number, yielding the string form.
    pub fn string_from_scalar<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(serde::de::Error::custom(format!(
                "expected string or number id, got {other}"
            ))),
        }
    }

    /// Optional string-or-number (table numbers arrive both ways).
    pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(other) => Err(serde::de::Error::custom(format!(
                "expected string or number, got {other}"
            ))),
        }
    }
}
