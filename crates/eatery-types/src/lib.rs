//! Shared payload types for the eatery document core.
//!
//! This crate is the single source of truth for every type that crosses the
//! document-engine boundary: object ids, workflow status codes, the base
//! bookkeeping record carried by every row, and the concrete user/order
//! payloads.
//!
//! ## Rules
//!
//! 1. Serialized keys are the legacy column names — every struct uses
//!    `#[serde(rename_all = "camelCase")]` so the relational layout stays
//!    byte-compatible with the original database.
//! 2. Optional fields skip serialization when absent. The engine performs
//!    sparse inserts; an absent key means "do not write this column".

pub mod common;
pub mod mlstring;
pub mod order;
pub mod user;

pub use common::{
    BaseRecord, ObjectId, Photo, UnknownStatusError, WfHistoryItem, WorkflowStatusCode,
};
pub use mlstring::MlString;
pub use order::{MealOption, OrderData, OrderItemData};
pub use user::{
    NotificationEvents, NotificationSettings, NotifyTool, UserData, UserSettings,
};
