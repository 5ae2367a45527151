//! Delivery of notifications and questions to channel subscribers, and
//! the post-answer update of delivered question messages.
//!
//! Fan-out is sequential: every send yields its message reference before
//! the question is closed. A failed send aborts the fan-out; messages sent
//! before the failure stay where they are.

use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};

use super::QuestionService;
use crate::models::question::{QuestionOption, QuestionRecord};
use crate::transport::{AnswerCallback, Button, Messenger};
use crate::{AppError, Result};

/// Send a plain notification to every recipient.
///
/// Returns whether at least one message was delivered.
///
/// # Errors
///
/// Returns the first transport error encountered.
pub async fn notify(
    messenger: &dyn Messenger,
    recipients: &[String],
    text: &str,
    cancel: &CancellationToken,
) -> Result<bool> {
    let mut delivered = false;
    for recipient in recipients {
        messenger.send(recipient, text, &[], cancel).await?;
        delivered = true;
    }
    Ok(delivered)
}

/// Create a question, deliver it to every recipient and close it.
///
/// Returns the identifier of the new question.
///
/// # Errors
///
/// Returns `AppError::Store` or `AppError::Cancelled` from the builder, or
/// the first transport error encountered during delivery.
pub async fn ask(
    questions: &QuestionService,
    messenger: &dyn Messenger,
    source_id: &str,
    recipients: &[String],
    text: &str,
    options: &[QuestionOption],
    cancel: CancellationToken,
) -> Result<String> {
    let tx = questions.begin(source_id, cancel.clone()).await?;
    let random_id = tx.random_id().to_owned();

    let span = info_span!("question_fanout", %random_id, recipients = recipients.len());
    async {
        let mut buttons = Vec::with_capacity(options.len());
        for option in options {
            tx.add_option(option.data.clone(), option.label.clone());
            let value = AnswerCallback {
                random_id: random_id.clone(),
                data: option.data.clone(),
            }
            .encode()?;
            buttons.push(Button {
                label: option.display_label().to_owned(),
                value,
            });
        }

        for recipient in recipients {
            let message = messenger.send(recipient, text, &buttons, &cancel).await?;
            tx.add_related_message(message);
        }

        tx.close().await?;
        info!(options = options.len(), "question delivered");
        Ok::<_, AppError>(random_id.clone())
    }
    .instrument(span)
    .await
}

/// Text of the reply posted under each delivered question message.
#[must_use]
pub fn answered_text(answerer_name: &str, label: &str) -> String {
    format!("Answered by {answerer_name}:\n\n{label}")
}

/// Remove the answer buttons from every delivered message of `record` and
/// reply with who answered and what.
///
/// # Errors
///
/// Returns the first transport error encountered.
pub async fn announce_answer(
    messenger: &dyn Messenger,
    record: &QuestionRecord,
    answerer_name: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    let label = record.answer_label().unwrap_or_default();
    let text = answered_text(answerer_name, label);

    for message in &record.related_messages {
        let updated = messenger.remove_buttons(message).await?;
        messenger.reply(&updated, &text, cancel).await?;
    }
    Ok(())
}
