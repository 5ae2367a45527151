//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Persistence failure when interacting with `SQLite`.
    Db(String),
    /// Slack API or Socket Mode failure.
    Slack(String),
    /// Ephemeral question store backend failure.
    Store(String),
    /// Requested entity does not exist (or is not visible to the caller).
    NotFound(String),
    /// Question fan-out has not finished; options are not trustworthy yet.
    NotReady(String),
    /// Answer data is not one of the question's options.
    InvalidAnswer(String),
    /// Question already carries an answer.
    AlreadyAnswered(String),
    /// Owning request was cancelled before the operation completed.
    Cancelled(String),
    /// Caller supplied malformed or out-of-range input.
    InvalidInput(String),
    /// Caller could not be authenticated.
    Unauthorized(String),
    /// Caller is authenticated but lacks the required capability.
    Forbidden(String),
    /// Entity with the same unique name already exists.
    AlreadyExists(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Whether the error is caused by the caller rather than the service.
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::NotReady(_)
                | Self::InvalidAnswer(_)
                | Self::AlreadyAnswered(_)
                | Self::InvalidInput(_)
                | Self::AlreadyExists(_)
        )
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::Slack(msg) => write!(f, "slack: {msg}"),
            Self::Store(msg) => write!(f, "store unavailable: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::NotReady(msg) => write!(f, "not ready: {msg}"),
            Self::InvalidAnswer(msg) => write!(f, "invalid answer: {msg}"),
            Self::AlreadyAnswered(msg) => write!(f, "already answered: {msg}"),
            Self::Cancelled(msg) => write!(f, "cancelled: {msg}"),
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            Self::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            Self::AlreadyExists(msg) => write!(f, "already exists: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Store(format!("malformed record: {err}"))
    }
}

#[cfg(feature = "redis-store")]
impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        Self::Store(err.to_string())
    }
}
