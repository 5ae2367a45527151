//! Input validation shared by the HTTP API and the admin commands.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::question::QuestionOption;
use crate::{AppError, Result};

/// Maximum byte length of an option's `data`.
///
/// The answer button value is `{"i":"<32 hex>","d":"<data>"}`, which must
/// stay within the 64 bytes some chat platforms allow for callback data.
pub const MAX_OPTION_DATA_BYTES: usize = 12;

const NAME_MIN_LEN: usize = 3;
const NAME_MAX_LEN: usize = 48;

static NAME_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z]+[a-z0-9]*$").ok());

/// Whether `name` is a valid channel or token name.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    let len = name.chars().count();
    if !(NAME_MIN_LEN..=NAME_MAX_LEN).contains(&len) || name.len() > NAME_MAX_LEN {
        return false;
    }
    NAME_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(name))
}

/// Validate the text and options of a new question.
///
/// # Errors
///
/// Returns `AppError::InvalidInput` describing the first problem found.
pub fn validate_question(text: &str, options: &[QuestionOption]) -> Result<()> {
    validate_text(text)?;
    if options.is_empty() {
        return Err(AppError::InvalidInput("no options provided".into()));
    }
    for option in options {
        if option.data.is_empty() {
            return Err(AppError::InvalidInput("option data must be defined".into()));
        }
        if option.data.len() > MAX_OPTION_DATA_BYTES {
            return Err(AppError::InvalidInput(format!(
                "max size for data is {MAX_OPTION_DATA_BYTES} bytes"
            )));
        }
    }
    Ok(())
}

/// Validate the body text of a notification or question.
///
/// # Errors
///
/// Returns `AppError::InvalidInput` if `text` is empty.
pub fn validate_text(text: &str) -> Result<()> {
    if text.is_empty() {
        return Err(AppError::InvalidInput("text may not be empty".into()));
    }
    Ok(())
}
