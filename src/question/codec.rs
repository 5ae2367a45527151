//! Byte encoding of question records and identifiers.

use uuid::Uuid;

use crate::models::question::QuestionRecord;
use crate::Result;

/// Generate a fresh external question identifier: 32 lowercase hex chars.
#[must_use]
pub fn random_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Store key of the record identified by `random_id`.
#[must_use]
pub fn record_key(prefix: &str, random_id: &str) -> String {
    format!("{prefix}{random_id}")
}

/// Serialize a record to its compact JSON form.
///
/// # Errors
///
/// Returns `AppError::Store` if serialization fails.
pub fn encode(record: &QuestionRecord) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(record)?)
}

/// Parse a record previously written by [`encode`].
///
/// # Errors
///
/// Returns `AppError::Store` if the bytes are not a valid record.
pub fn decode(bytes: &[u8]) -> Result<QuestionRecord> {
    Ok(serde_json::from_slice(bytes)?)
}
