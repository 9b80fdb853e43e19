//! Core bookkeeping types shared by every document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mlstring::MlString;

/// Primary-key type of every document and child record (`bigint(20)`).
pub type ObjectId = i64;

/// Workflow status of a document.
///
/// Stored as its numeric code in the `wfStatus` column, so the wire form is
/// the bare integer rather than the variant name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum WorkflowStatusCode {
    Draft,
    Registered,
    Approved,
    Paid,
    Done,
    Review,
    Closed,
    CanceledByEatery,
    CanceledByGuest,
}

impl WorkflowStatusCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Registered => "registered",
            Self::Approved => "approved",
            Self::Paid => "paid",
            Self::Done => "done",
            Self::Review => "review",
            Self::Closed => "closed",
            Self::CanceledByEatery => "canceledByEatery",
            Self::CanceledByGuest => "canceledByGuest",
        }
    }
}

impl From<WorkflowStatusCode> for i32 {
    fn from(code: WorkflowStatusCode) -> Self {
        match code {
            WorkflowStatusCode::Draft => 0,
            WorkflowStatusCode::Registered => 1,
            WorkflowStatusCode::Approved => 2,
            WorkflowStatusCode::Paid => 3,
            WorkflowStatusCode::Done => 4,
            WorkflowStatusCode::Review => 5,
            WorkflowStatusCode::Closed => 6,
            WorkflowStatusCode::CanceledByEatery => 7,
            WorkflowStatusCode::CanceledByGuest => 8,
        }
    }
}

impl TryFrom<i32> for WorkflowStatusCode {
    type Error = UnknownStatusError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Draft),
            1 => Ok(Self::Registered),
            2 => Ok(Self::Approved),
            3 => Ok(Self::Paid),
            4 => Ok(Self::Done),
            5 => Ok(Self::Review),
            6 => Ok(Self::Closed),
            7 => Ok(Self::CanceledByEatery),
            8 => Ok(Self::CanceledByGuest),
            other => Err(UnknownStatusError(other)),
        }
    }
}

impl std::fmt::Display for WorkflowStatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown workflow status code: {0}")]
pub struct UnknownStatusError(pub i32);

/// One entry of the `wfHistory` column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WfHistoryItem {
    pub wf_status: WorkflowStatusCode,
    pub created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by_user: Option<String>,
}

/// The bookkeeping fields implicitly present on every table.
///
/// Everything is optional: a freshly composed payload carries none of these,
/// the engine stamps them on save and the database fills the rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_by_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wf_status: Option<WorkflowStatusCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wf_history: Option<Vec<WfHistoryItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_by_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed: Option<DateTime<Utc>>,
}

/// A photo attached to a meal or user profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<MlString>,
}
