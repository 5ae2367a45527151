//! Outbound messaging abstraction.
//!
//! The [`Messenger`] trait decouples question fan-out and answer
//! announcements from the chat platform. The production implementation is
//! [`crate::slack::client::SlackService`]; tests substitute a recording
//! fake.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::models::question::RelatedMessage;
use crate::Result;

/// Boxed future returned by [`Messenger`] operations.
pub type MessengerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Action id carried by every question answer button.
pub const ANSWER_ACTION_ID: &str = "question_answer";

/// An interactive button attached to an outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    /// Text shown on the button.
    pub label: String,
    /// Opaque value returned when the button is pressed.
    pub value: String,
}

/// Payload embedded in an answer button and returned on press.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerCallback {
    /// Question identifier.
    #[serde(rename = "i")]
    pub random_id: String,
    /// Chosen option data.
    #[serde(rename = "d")]
    pub data: String,
}

impl AnswerCallback {
    /// Encode the payload as compact JSON.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` if serialization fails.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a payload produced by [`encode`](Self::encode).
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidInput` if `raw` is not a valid payload.
    pub fn decode(raw: &str) -> Result<Self> {
        serde_json::from_str(raw.trim())
            .map_err(|err| crate::AppError::InvalidInput(format!("bad callback payload: {err}")))
    }
}

/// Chat platform operations needed by the relay.
pub trait Messenger: Send + Sync {
    /// Send `text` with optional `buttons` to a user's direct conversation.
    ///
    /// `cancel` aborts any backoff between delivery attempts.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Slack` if the platform rejects the message, or
    /// `AppError::Cancelled` if `cancel` fires while backing off.
    fn send(
        &self,
        recipient: &str,
        text: &str,
        buttons: &[Button],
        cancel: &CancellationToken,
    ) -> MessengerFuture<'_, RelatedMessage>;

    /// Strip interactive buttons from a previously sent message.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Slack` if the message cannot be updated.
    fn remove_buttons(&self, message: &RelatedMessage) -> MessengerFuture<'_, RelatedMessage>;

    /// Post `text` as a threaded reply to `message`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Slack` if the reply cannot be posted, or
    /// `AppError::Cancelled` if `cancel` fires while backing off.
    fn reply(
        &self,
        message: &RelatedMessage,
        text: &str,
        cancel: &CancellationToken,
    ) -> MessengerFuture<'_, ()>;
}
