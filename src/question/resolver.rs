//! Answer commit for ready questions.

use chrono::Utc;
use tracing::{debug, error, info};

use super::{codec, QuestionService};
use crate::models::question::{QuestionAnswer, QuestionRecord};
use crate::{AppError, Result};

/// Check that `answer_data` may be committed to `record`.
fn validate(record: &QuestionRecord, answer_data: &str) -> Result<()> {
    if !record.ready {
        return Err(AppError::NotReady(
            "question not delivered to all recipients, please wait".into(),
        ));
    }
    if record.option(answer_data).is_none() {
        return Err(AppError::InvalidAnswer(format!(
            "{answer_data:?} is not an option of this question"
        )));
    }
    if record.answer.is_some() {
        return Err(AppError::AlreadyAnswered(format!(
            "question {} already has an answer",
            record.random_id
        )));
    }
    Ok(())
}

impl QuestionService {
    /// Commit `answer_data` from `answerer_id` as the answer of `random_id`.
    ///
    /// The first valid answer wins: the write is conditional on the record
    /// being unchanged since it was read. A lost race re-reads and
    /// re-validates, so contention always settles as a commit or as one of
    /// the validation errors below. On success the identifier is published
    /// on the answer channel and the updated record is returned; a failed
    /// publish after the commit is logged, not returned.
    ///
    /// # Errors
    ///
    /// - `AppError::NotFound` if the record does not exist or expired.
    /// - `AppError::NotReady` if the fan-out has not been closed.
    /// - `AppError::InvalidAnswer` if `answer_data` is not an option.
    /// - `AppError::AlreadyAnswered` if an answer was committed before.
    /// - `AppError::Store` if the store fails.
    pub async fn answer(
        &self,
        random_id: &str,
        answerer_id: &str,
        answer_data: &str,
    ) -> Result<QuestionRecord> {
        let key = self.key(random_id);

        let mut attempt = 0_u32;
        loop {
            attempt += 1;
            let current = self
                .store
                .get(&key)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("question {random_id}")))?;

            let mut record = codec::decode(&current)?;
            validate(&record, answer_data)?;

            record.answer = Some(QuestionAnswer {
                answerer_id: answerer_id.to_owned(),
                answer_data: answer_data.to_owned(),
                answered_at: Utc::now(),
            });
            let updated = codec::encode(&record)?;

            let committed = self
                .store
                .compare_and_swap(&key, current, updated, self.settings.answered_ttl)
                .await?;

            if !committed {
                debug!(random_id, attempt, "answer write lost a race; re-validating");
                continue;
            }

            info!(random_id, answerer_id, answer_data, "question answered");

            // The answer is durable at this point; a failed wakeup only
            // delays pollers until their next read.
            if let Err(err) = self
                .store
                .publish(&self.settings.answer_channel, random_id)
                .await
            {
                error!(%err, random_id, "failed to publish answer wakeup");
            }

            return Ok(record);
        }
    }
}
