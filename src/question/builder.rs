//! Transactional builder for new questions.
//!
//! A question record is reserved in the store before any message is sent
//! so that its identifier can be embedded in the answer buttons. Options
//! and message references accumulate in memory while the fan-out runs and
//! are written in one piece by [`NewQuestionTx::close`].

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{codec, QuestionService};
use crate::models::question::{QuestionOption, QuestionRecord, RelatedMessage};
use crate::store::EphemeralStore;
use crate::{AppError, Result};

/// An open question whose fan-out is in progress.
pub struct NewQuestionTx {
    random_id: String,
    key: String,
    record: Mutex<QuestionRecord>,
    store: Arc<dyn EphemeralStore>,
    answered_ttl: Duration,
    cancel: CancellationToken,
}

impl QuestionService {
    /// Reserve a new question record owned by `source_id`.
    ///
    /// The record is created with the inflight TTL and `ready = false`.
    /// Identifier collisions are retried with a fresh identifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Store` if the store fails, or
    /// `AppError::Cancelled` if `cancel` fires while retrying.
    pub async fn begin(&self, source_id: &str, cancel: CancellationToken) -> Result<NewQuestionTx> {
        loop {
            let random_id = codec::random_id();
            let record = QuestionRecord::new(random_id.clone(), source_id);
            let key = self.key(&random_id);

            let created = self
                .store
                .set_nx(&key, codec::encode(&record)?, self.settings.inflight_ttl)
                .await?;

            if created {
                debug!(random_id, source_id, "question record reserved");
                return Ok(NewQuestionTx {
                    random_id,
                    key,
                    record: Mutex::new(record),
                    store: Arc::clone(&self.store),
                    answered_ttl: self.settings.answered_ttl,
                    cancel,
                });
            }

            warn!(random_id, "question id collision; retrying");
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled(
                    "question creation cancelled".into(),
                ));
            }
        }
    }
}

impl NewQuestionTx {
    /// Identifier of the reserved question.
    #[must_use]
    pub fn random_id(&self) -> &str {
        &self.random_id
    }

    /// Append an answer option. Order of calls is preserved.
    pub fn add_option(&self, data: impl Into<String>, label: impl Into<String>) {
        self.with_record(|record| record.options.push(QuestionOption::new(data, label)));
    }

    /// Record a message sent while delivering the question.
    pub fn add_related_message(&self, message: RelatedMessage) {
        self.with_record(|record| record.related_messages.push(message));
    }

    /// Mark the question ready and write the accumulated state.
    ///
    /// The record is re-armed with the answered TTL. When the owning
    /// request was cancelled nothing is written and the inflight record is
    /// left to expire.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Cancelled` if the owning token fired, or
    /// `AppError::Store` if the write fails.
    pub async fn close(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            info!(random_id = %self.random_id, "question cancelled before close");
            return Err(AppError::Cancelled(format!(
                "question {} was cancelled during fan-out",
                self.random_id
            )));
        }

        let bytes = self.with_record(|record| {
            record.ready = true;
            codec::encode(record)
        })?;

        self.store.set(&self.key, bytes, self.answered_ttl).await?;
        info!(random_id = %self.random_id, "question closed");
        Ok(())
    }

    fn with_record<T>(&self, f: impl FnOnce(&mut QuestionRecord) -> T) -> T {
        let mut guard = self.record.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}
