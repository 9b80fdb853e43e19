//! Document error taxonomy.
//!
//! Every error carries a stable numeric code and a symbolic short name so
//! transport boundaries can surface all three (code, name, message) without
//! re-deriving them.

use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentError {
    /// Fallback kind, also used for malformed construction input.
    #[error("unknown: {0}")]
    Unknown(String),

    /// Schema, id or data accessed before the document is in a usable state.
    #[error("abstract method: {0}")]
    AbstractMethod(String),

    /// No usable database connection.
    #[error("connection: {0}")]
    Connection(String),

    /// Lookup matched zero or more than one rows where exactly one was required.
    #[error("not found: {0}")]
    NotFound(String),

    /// A mandatory input is missing.
    #[error("parameter expected: {0}")]
    ParameterExpected(String),

    /// Workflow transition has zero, multiple, or an invalid target among
    /// candidate edges. The name is historical; it also covers "not a legal
    /// transition".
    #[error("workflow suspense: {0}")]
    WfSuspense(String),

    /// Reserved for caller-level validation.
    #[error("redundant value: {0}")]
    RedundantValue(String),

    /// Reserved for caller-level validation.
    #[error("role required: {0}")]
    RoleRequired(String),

    /// Storage-layer failure propagated unchanged (maps to the fallback code).
    #[error("sql: {0}")]
    Sql(#[from] sqlx::Error),
}

impl DocumentError {
    /// Stable numeric code of this error kind.
    pub fn code(&self) -> u8 {
        match self {
            Self::Unknown(_) | Self::Sql(_) => 0,
            Self::AbstractMethod(_) => 1,
            Self::Connection(_) => 2,
            Self::NotFound(_) => 3,
            Self::ParameterExpected(_) => 4,
            Self::WfSuspense(_) => 5,
            Self::RedundantValue(_) => 6,
            Self::RoleRequired(_) => 7,
        }
    }

    /// Symbolic name matching the numeric code.
    pub fn short_name(&self) -> &'static str {
        match self {
            Self::Unknown(_) | Self::Sql(_) => "unknown",
            Self::AbstractMethod(_) => "abstract_method",
            Self::Connection(_) => "sql_connection_error",
            Self::NotFound(_) => "sql_not_found",
            Self::ParameterExpected(_) => "parameter_expected",
            Self::WfSuspense(_) => "wf_suspense",
            Self::RedundantValue(_) => "redundant_value",
            Self::RoleRequired(_) => "role_required",
        }
    }

    /// Transport form: `{code, shortName, message}`.
    pub fn json(&self) -> serde_json::Value {
        json!({
            "code": self.code(),
            "shortName": self.short_name(),
            "message": self.to_string(),
        })
    }
}
