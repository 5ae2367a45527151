//! Producer API token.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operations a token may perform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// `POST /notify`.
    Notify,
    /// `POST /question` and the question read endpoints.
    Question,
}

impl Capability {
    /// Parse a capability from its command-line spelling.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "notify" => Some(Self::Notify),
            "question" => Some(Self::Question),
            _ => None,
        }
    }

    /// Command-line spelling.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Notify => "notify",
            Self::Question => "question",
        }
    }
}

/// Channel reference carried by a token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AllowedChannel {
    /// Channel row identifier.
    pub id: i64,
    /// Channel name.
    pub name: String,
}

/// Bearer token used by producers to call the HTTP API.
///
/// Only the SHA-256 hash of the secret is stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Token {
    /// Row identifier; recorded as the source of questions.
    pub id: i64,
    /// Unique token name, shown in message prefixes.
    pub name: String,
    /// May send notifications.
    pub cap_notify: bool,
    /// May ask and read questions.
    pub cap_question: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last successful authentication.
    pub last_used: Option<DateTime<Utc>>,
    /// Live channels this token may target.
    #[serde(default)]
    pub allowed_channels: Vec<AllowedChannel>,
}

impl Token {
    /// Whether the token carries `capability`.
    #[must_use]
    pub fn can(&self, capability: Capability) -> bool {
        match capability {
            Capability::Notify => self.cap_notify,
            Capability::Question => self.cap_question,
        }
    }

    /// Find an allowed channel by name.
    #[must_use]
    pub fn allowed_channel(&self, name: &str) -> Option<&AllowedChannel> {
        self.allowed_channels.iter().find(|ch| ch.name == name)
    }

    /// Identifier recorded as a question's `source_id`.
    #[must_use]
    pub fn source_id(&self) -> String {
        self.id.to_string()
    }
}
