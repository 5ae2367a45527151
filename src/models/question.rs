//! Ephemeral question record and its parts.
//!
//! The record is stored as JSON in the ephemeral store with one-letter
//! field names to keep the value small; see [`crate::question::codec`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One selectable answer offered with a question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionOption {
    /// Opaque value returned to the producer when this option is chosen.
    #[serde(rename = "d")]
    pub data: String,
    /// Human-readable button text. May be empty.
    #[serde(rename = "l", default, skip_serializing_if = "String::is_empty")]
    pub label: String,
}

impl QuestionOption {
    /// Construct an option from its data and label.
    #[must_use]
    pub fn new(data: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            label: label.into(),
        }
    }

    /// Text shown to recipients: the label, or the data when no label is set.
    #[must_use]
    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.data
        } else {
            &self.label
        }
    }
}

/// Reference to an outbound message created while delivering a question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelatedMessage {
    /// Transport message identifier (Slack message `ts`).
    #[serde(rename = "m")]
    pub message_id: String,
    /// Conversation the message lives in (Slack channel or DM id).
    #[serde(rename = "c")]
    pub chat_id: String,
}

impl RelatedMessage {
    /// Construct a message reference.
    #[must_use]
    pub fn new(message_id: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            chat_id: chat_id.into(),
        }
    }
}

/// The single committed answer of a question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionAnswer {
    /// User who picked the option.
    #[serde(rename = "u")]
    pub answerer_id: String,
    /// `data` of the chosen option.
    #[serde(rename = "d")]
    pub answer_data: String,
    /// Commit time.
    #[serde(rename = "t")]
    pub answered_at: DateTime<Utc>,
}

/// Short-lived, multi-recipient question state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionRecord {
    /// External identifier; also the wakeup payload.
    #[serde(rename = "i")]
    pub random_id: String,
    /// Identifier of the producer token that created the question.
    #[serde(rename = "s")]
    pub source_id: String,
    /// Offered options in insertion order.
    #[serde(rename = "o", default)]
    pub options: Vec<QuestionOption>,
    /// Every message sent while fanning the question out.
    #[serde(rename = "m", default)]
    pub related_messages: Vec<RelatedMessage>,
    /// Set once the fan-out finished and the record was closed.
    #[serde(rename = "r", default)]
    pub ready: bool,
    /// Committed answer, absent until answered.
    #[serde(rename = "a", default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<QuestionAnswer>,
}

impl QuestionRecord {
    /// Create an empty, not-yet-ready record.
    #[must_use]
    pub fn new(random_id: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            random_id: random_id.into(),
            source_id: source_id.into(),
            options: Vec::new(),
            related_messages: Vec::new(),
            ready: false,
            answer: None,
        }
    }

    /// Whether the record is closed and carries a committed answer.
    #[must_use]
    pub fn is_answered(&self) -> bool {
        self.ready && self.answer.is_some()
    }

    /// Look up the option whose data equals `data`.
    #[must_use]
    pub fn option(&self, data: &str) -> Option<&QuestionOption> {
        self.options.iter().find(|op| op.data == data)
    }

    /// Display label of the committed answer, if any.
    #[must_use]
    pub fn answer_label(&self) -> Option<&str> {
        let answer = self.answer.as_ref()?;
        Some(
            self.option(&answer.answer_data)
                .map_or(answer.answer_data.as_str(), QuestionOption::display_label),
        )
    }
}
