//! Request and response bodies of the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::question::{QuestionOption, QuestionRecord};
use crate::models::user::User;

/// `POST /notify` body.
#[derive(Debug, Clone, Deserialize)]
pub struct NotifyRequest {
    /// Message body.
    pub text: String,
    /// Target channel name.
    pub channel: String,
}

/// `POST /notify` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyResponse {
    /// Whether at least one subscriber received the message.
    pub delivered_to_anyone: bool,
}

/// One answer choice in a [`QuestionRequest`].
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionOptionRequest {
    /// Returned as the answer when chosen.
    pub data: String,
    /// Shown on the button; `data` is shown when empty.
    #[serde(default)]
    pub label: String,
}

impl From<QuestionOptionRequest> for QuestionOption {
    fn from(option: QuestionOptionRequest) -> Self {
        QuestionOption::new(option.data, option.label)
    }
}

/// `POST /question` body.
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionRequest {
    /// Question body.
    pub text: String,
    /// Target channel name.
    pub channel: String,
    /// Answer choices, in button order.
    #[serde(default)]
    pub options: Vec<QuestionOptionRequest>,
}

/// Public view of the user who answered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRepr {
    /// Slack user id.
    pub id: String,
    /// Last seen display name; may be empty.
    pub display_name: String,
}

impl From<&User> for UserRepr {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            display_name: user.display_name.clone(),
        }
    }
}

/// Answer part of a [`QuestionResponse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRepr {
    /// Data of the chosen option.
    pub data: String,
    /// When the answer was committed.
    pub at: DateTime<Utc>,
    /// Who answered.
    pub by: UserRepr,
}

/// `GET /question/{id}` and `POST /question` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionResponse {
    /// Question identifier.
    pub id: String,
    /// `null` until answered.
    pub answer: Option<AnswerRepr>,
}

impl QuestionResponse {
    /// Response for a question that has no answer yet.
    #[must_use]
    pub fn pending(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            answer: None,
        }
    }

    /// Response for `record`, with the answerer resolved to `by`.
    #[must_use]
    pub fn from_record(record: &QuestionRecord, by: Option<UserRepr>) -> Self {
        let answer = record
            .answer
            .as_ref()
            .filter(|_| record.is_answered())
            .map(|answer| AnswerRepr {
                data: answer.answer_data.clone(),
                at: answer.answered_at,
                by: by.unwrap_or_else(|| UserRepr {
                    id: answer.answerer_id.clone(),
                    display_name: String::new(),
                }),
            });
        Self {
            id: record.random_id.clone(),
            answer,
        }
    }
}
