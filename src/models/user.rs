//! Chat user known to the relay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A recipient of notifications and questions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct User {
    /// Slack user identifier.
    pub id: String,
    /// Display name last seen for this user. Empty until known.
    pub display_name: String,
    /// Inactive users may not subscribe or answer.
    pub active: bool,
    /// Administrators manage channels and tokens.
    pub admin: bool,
    /// First time the user was recorded.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Construct a new active user with no display name.
    #[must_use]
    pub fn new(id: impl Into<String>, admin: bool) -> Self {
        Self {
            id: id.into(),
            display_name: String::new(),
            active: true,
            admin,
            created_at: Utc::now(),
        }
    }

    /// Name used when addressing the user in messages.
    #[must_use]
    pub fn greet(&self) -> String {
        if self.display_name.trim().is_empty() {
            format!("<@{}>", self.id)
        } else {
            self.display_name.clone()
        }
    }
}
