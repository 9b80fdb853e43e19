//! User payload types.

use serde::{Deserialize, Serialize};

use crate::common::{BaseRecord, Photo};

/// Channel used for user notifications. Stored as its numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum NotifyTool {
    Telegram,
    Email,
}

impl From<NotifyTool> for i32 {
    fn from(tool: NotifyTool) -> Self {
        match tool {
            NotifyTool::Telegram => 0,
            NotifyTool::Email => 1,
        }
    }
}

impl TryFrom<i32> for NotifyTool {
    type Error = crate::common::UnknownStatusError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Telegram),
            1 => Ok(Self::Email),
            other => Err(crate::common::UnknownStatusError(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvents {
    pub sign_in_success: bool,
    pub sign_in_fail: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub tool: NotifyTool,
    pub events: NotificationEvents,
}

/// Per-user settings, stored in the `settings` JSON column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    pub notifications: NotificationSettings,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            notifications: NotificationSettings {
                tool: NotifyTool::Telegram,
                events: NotificationEvents {
                    sign_in_success: true,
                    sign_in_fail: true,
                },
            },
        }
    }
}

/// Row payload of the `users` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    #[serde(flatten)]
    pub base: BaseRecord,
    pub login: String,
    pub email: String,
    pub name: String,
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Telegram user id, when the account is linked to the mini-app.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tguid: Option<String>,
    pub sign_in_attempts_count: i64,
    pub settings: UserSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<Photo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> UserData {
        UserData {
            base: BaseRecord::default(),
            login: "a".into(),
            email: "a@x.com".into(),
            name: "A".into(),
            hash: "h".into(),
            phone: None,
            tguid: None,
            sign_in_attempts_count: 0,
            settings: UserSettings::default(),
            photo: None,
        }
    }

    #[test]
    fn serialized_keys_match_column_names() {
        let json = serde_json::to_value(sample()).unwrap();
        assert!(json.get("signInAttemptsCount").is_some());
        assert!(json.get("login").is_some());
        // Absent optionals must be absent keys, not nulls.
        assert!(json.get("phone").is_none());
        assert!(json.get("id").is_none());
    }

    #[test]
    fn settings_round_trip() {
        let json = serde_json::to_string(&UserSettings::default()).unwrap();
        let back: UserSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, UserSettings::default());
        assert!(json.contains("signInSuccess"));
    }
}
