//! Concrete eatery entities over the document engine.
//!
//! Each entity is a zero-sized [`eatery_document::Entity`] implementation
//! binding a payload type from `eatery-types` to its table and workflow
//! schemas, plus whatever entity-specific logic the backend needs (password
//! hashing for users, for instance).

pub mod order;
pub mod user;

pub use order::Order;
pub use user::User;
