//! Order payload types.
//!
//! An order is a parent document with a related `items` table; each item
//! snapshots the meal requisites and the chosen option at ordering time.

use serde::{Deserialize, Serialize};

use crate::common::{BaseRecord, ObjectId};
use crate::mlstring::MlString;

/// A selectable variant of a meal (size, side, extras).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealOption {
    pub article: String,
    pub name: MlString,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<MlString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub es_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<bool>,
}

/// Row payload of the related `order_items` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemData {
    #[serde(flatten)]
    pub base: BaseRecord,
    /// Foreign key to the parent order; filled by the engine on save.
    /// The column keeps the legacy snake_case name (related prefix + "id").
    #[serde(rename = "order_id", default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<ObjectId>,
    pub name: MlString,
    pub description: MlString,
    pub option: MealOption,
    pub count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Row payload of the `orders` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderData {
    #[serde(flatten)]
    pub base: BaseRecord,
    /// Related child records; removal from this array deletes the row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<OrderItemData>>,
    pub discount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub es_id: Option<String>,
}
