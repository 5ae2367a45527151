//! Named broadcast channel that users subscribe to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named audience for notifications and questions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Channel {
    /// Row identifier.
    pub id: i64,
    /// Unique name; stays reserved after deletion.
    pub name: String,
    /// User who created the channel, when known.
    pub creator_id: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Subscribed user ids. Only filled by lookups that load them.
    #[serde(default)]
    pub subscribers: Vec<String>,
}
