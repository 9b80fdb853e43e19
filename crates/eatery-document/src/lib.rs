//! Generic MySQL document engine for the eatery backend.
//!
//! The engine persists a parent record plus an arbitrary set of related
//! child records in a single transaction, derives table DDL from a
//! declarative schema (created lazily when a statement first hits a missing
//! table), and maintains a workflow-status history with transition
//! validation.
//!
//! ## Layering
//!
//! ```text
//! entity (User, Order)           eatery-model
//!   └─ Document<E> / workflow    document.rs, workflow.rs
//!        └─ DocumentStore        store.rs (pooled connections)
//!             └─ MySQL
//! ```
//!
//! All SQL is runtime-checked (`sqlx::query`, not the compile-time macros)
//! so the crate builds without a live database.

pub mod ddl;
pub mod document;
pub mod error;
pub mod schema;
pub mod store;
pub mod workflow;

pub use document::{Document, Entity};
pub use error::DocumentError;
pub use schema::{
    DocumentDataSchema, DocumentWfSchema, FieldType, IndexType, TableFieldSchema,
    TableIndexSchema, WfTransfer,
};
pub use store::{DbConfig, DocumentStore};
pub use workflow::Transition;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, DocumentError>;
