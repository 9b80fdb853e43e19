//! Multilingual strings.
//!
//! A value is either a plain string or a map of per-language overrides with
//! a default fallback. The serialized form is untagged so both shapes read
//! back from the same JSON column.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MlString {
    Plain(String),
    Localized {
        default: String,
        values: Vec<(String, String)>,
    },
}

impl MlString {
    /// The default-language rendering.
    pub fn default_text(&self) -> &str {
        match self {
            Self::Plain(s) => s,
            Self::Localized { default, .. } => default,
        }
    }

    /// Rendering for `lang`, falling back to the default text.
    pub fn text(&self, lang: &str) -> &str {
        match self {
            Self::Plain(s) => s,
            Self::Localized { default, values } => values
                .iter()
                .find(|(l, _)| l == lang)
                .map_or(default.as_str(), |(_, v)| v.as_str()),
        }
    }
}

impl From<&str> for MlString {
    fn from(s: &str) -> Self {
        Self::Plain(s.to_string())
    }
}

impl From<String> for MlString {
    fn from(s: String) -> Self {
        Self::Plain(s)
    }
}

impl std::fmt::Display for MlString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.default_text())
    }
}
