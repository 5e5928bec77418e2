//! Grouping keys for interval measurement.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key used for every message when per-key separation is disabled.
pub const SHARED_KEY: &str = "all_topics";

/// Identifier under which intervals are measured independently.
///
/// Usually the message topic. When topic-based separation is disabled every
/// message maps to [`Key::shared`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(String);

impl Key {
    /// Creates a key from any string-like value.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The sentinel key shared by all messages.
    pub fn shared() -> Self {
        Self(SHARED_KEY.to_string())
    }

    /// Derives a key from a topic value found in a message.
    ///
    /// Strings are used verbatim, other scalars by their JSON text. A missing
    /// or null topic falls back to the shared key.
    pub fn from_topic(topic: Option<&Value>) -> Self {
        match topic {
            None | Some(Value::Null) => Self::shared(),
            Some(Value::String(s)) => Self(s.clone()),
            Some(other) => Self(other.to_string()),
        }
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
