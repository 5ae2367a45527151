//! Point lookup of question records.

use super::{codec, QuestionService};
use crate::models::question::QuestionRecord;
use crate::{AppError, Result};

impl QuestionService {
    /// Read the current state of `random_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the record does not exist or expired,
    /// or `AppError::Store` if the store fails or holds a malformed value.
    pub async fn read(&self, random_id: &str) -> Result<QuestionRecord> {
        let bytes = self
            .store
            .get(&self.key(random_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("question {random_id}")))?;
        codec::decode(&bytes)
    }
}
