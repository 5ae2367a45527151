//! Long-poll wait for a question's answer.
//!
//! The waiter subscribes to the answer channel *before* reading the
//! record. An answer committed between the read and the first wakeup is
//! therefore still delivered, and an answer committed before the
//! subscription is seen by the read.

use std::time::Duration;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::QuestionService;
use crate::models::question::QuestionRecord;
use crate::store::Wakeup;
use crate::{AppError, Result};

/// Terminal state of [`QuestionService::wait_for_answer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The question carries an answer.
    Answered(QuestionRecord),
    /// No answer arrived before the deadline.
    TimedOut,
    /// The caller went away.
    Cancelled,
}

impl QuestionService {
    /// Block until `random_id` is answered, `timeout` elapses or `cancel`
    /// fires, whichever comes first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the record does not exist (or
    /// expires while waiting), or `AppError::Store` if the store fails.
    pub async fn wait_for_answer(
        &self,
        random_id: &str,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<WaitOutcome> {
        let mut wakeups = self
            .store
            .subscribe(&self.settings.answer_channel)
            .await?;

        let record = self.read(random_id).await?;
        if record.is_answered() {
            debug!(random_id, "question already answered");
            return Ok(WaitOutcome::Answered(record));
        }

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!(random_id, "answer wait cancelled");
                    return Ok(WaitOutcome::Cancelled);
                }
                () = &mut deadline => {
                    info!(random_id, ?timeout, "answer wait timed out");
                    return Ok(WaitOutcome::TimedOut);
                }
                wakeup = wakeups.next() => match wakeup {
                    Some(Wakeup::Topic(id)) if id == random_id => {}
                    Some(Wakeup::Topic(_)) => continue,
                    Some(Wakeup::Missed) => {
                        debug!(random_id, "missed wakeups; re-reading");
                    }
                    None => {
                        return Err(AppError::Store("answer subscription closed".into()));
                    }
                },
            }

            let record = self.read(random_id).await?;
            if record.is_answered() {
                return Ok(WaitOutcome::Answered(record));
            }
        }
    }
}
