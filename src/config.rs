//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Upper bound for every configured TTL, timeout and interval (one year).
pub const MAX_DURATION_SECONDS: u64 = 365 * 24 * 60 * 60;

/// Keychain service name holding the Slack credentials.
const KEYRING_SERVICE: &str = "question-relay";

/// Nested Slack configuration for Socket Mode connectivity.
///
/// Tokens are loaded at runtime via OS keychain or environment variables,
/// not from the TOML config file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SlackConfig {
    /// App-level token used for Socket Mode (populated at runtime).
    #[serde(skip)]
    pub app_token: String,
    /// Bot user token used for posting messages (populated at runtime).
    #[serde(skip)]
    pub bot_token: String,
}

impl SlackConfig {
    /// Whether both tokens were loaded and Slack can be started.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.app_token.is_empty() && !self.bot_token.is_empty()
    }
}

/// Which ephemeral store backend holds question records.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// In-process store; wakeups only reach waiters in this process.
    #[default]
    Memory,
    /// Redis server shared by every relay process.
    Redis,
}

/// Ephemeral store connection settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct StoreConfig {
    /// Backend selection.
    #[serde(default)]
    pub backend: StoreBackend,
    /// Connection URL used by the Redis backend.
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            redis_url: default_redis_url(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://localhost:6379/0".into()
}

/// Question lifecycle timings and store naming.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct QuestionConfig {
    /// Lifetime of a record whose fan-out has not been closed.
    #[serde(default = "default_inflight_ttl")]
    pub inflight_ttl_seconds: u64,
    /// Lifetime of a closed or answered record.
    #[serde(default = "default_answered_ttl")]
    pub answered_ttl_seconds: u64,
    /// Upper bound for a single long-poll request.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_seconds: u64,
    /// Prefix prepended to every question key.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Pub/sub channel carrying answer wakeups.
    #[serde(default = "default_answer_channel")]
    pub answer_channel: String,
    /// How often the in-memory store purges expired records.
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval_seconds: u64,
}

impl Default for QuestionConfig {
    fn default() -> Self {
        Self {
            inflight_ttl_seconds: default_inflight_ttl(),
            answered_ttl_seconds: default_answered_ttl(),
            poll_timeout_seconds: default_poll_timeout(),
            key_prefix: default_key_prefix(),
            answer_channel: default_answer_channel(),
            reaper_interval_seconds: default_reaper_interval(),
        }
    }
}

impl QuestionConfig {
    /// Inflight TTL as a [`Duration`].
    #[must_use]
    pub fn inflight_ttl(&self) -> Duration {
        Duration::from_secs(self.inflight_ttl_seconds)
    }

    /// Answered TTL as a [`Duration`].
    #[must_use]
    pub fn answered_ttl(&self) -> Duration {
        Duration::from_secs(self.answered_ttl_seconds)
    }

    /// Long-poll timeout as a [`Duration`].
    #[must_use]
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_seconds)
    }

    /// Reaper tick as a [`Duration`].
    #[must_use]
    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_seconds)
    }
}

fn default_inflight_ttl() -> u64 {
    300
}

fn default_answered_ttl() -> u64 {
    2 * 60 * 60
}

fn default_poll_timeout() -> u64 {
    120
}

fn default_key_prefix() -> String {
    "QST_".into()
}

fn default_answer_channel() -> String {
    "ANSWERED_CHAN".into()
}

fn default_reaper_interval() -> u64 {
    30
}

fn default_http_bind() -> String {
    "0.0.0.0:8081".into()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("question-relay.db")
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Socket address the HTTP API binds to.
    #[serde(default = "default_http_bind")]
    pub http_bind: String,
    /// `SQLite` database file holding users, channels and tokens.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// Slack user IDs seeded as active users on startup.
    #[serde(default)]
    pub authorized_user_ids: Vec<String>,
    /// Slack user IDs seeded as administrators on startup.
    #[serde(default)]
    pub admin_user_ids: Vec<String>,
    /// Slack connectivity settings.
    #[serde(default)]
    pub slack: SlackConfig,
    /// Ephemeral store settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Question lifecycle settings.
    #[serde(default)]
    pub questions: QuestionConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load Slack credentials from OS keychain with env-var fallback.
    ///
    /// Tries the `question-relay` keyring service first, then falls
    /// back to `SLACK_APP_TOKEN` / `SLACK_BOT_TOKEN` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither keychain nor env vars provide
    /// the required tokens.
    pub async fn load_credentials(&mut self) -> Result<()> {
        self.slack.app_token = load_credential("slack_app_token", "SLACK_APP_TOKEN").await?;
        self.slack.bot_token = load_credential("slack_bot_token", "SLACK_BOT_TOKEN").await?;
        Ok(())
    }

    /// Whether `user_id` is configured as an administrator.
    #[must_use]
    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admin_user_ids.iter().any(|id| id == user_id)
    }

    fn validate(&mut self) -> Result<()> {
        let q = &self.questions;
        if q.inflight_ttl_seconds == 0 || q.answered_ttl_seconds == 0 {
            return Err(AppError::Config(
                "question TTLs must be greater than zero".into(),
            ));
        }
        if q.poll_timeout_seconds == 0 {
            return Err(AppError::Config(
                "poll_timeout_seconds must be greater than zero".into(),
            ));
        }
        if q.reaper_interval_seconds == 0 {
            return Err(AppError::Config(
                "reaper_interval_seconds must be greater than zero".into(),
            ));
        }
        let durations = [
            ("inflight_ttl_seconds", q.inflight_ttl_seconds),
            ("answered_ttl_seconds", q.answered_ttl_seconds),
            ("poll_timeout_seconds", q.poll_timeout_seconds),
            ("reaper_interval_seconds", q.reaper_interval_seconds),
        ];
        if let Some((name, _)) = durations
            .iter()
            .find(|(_, secs)| *secs > MAX_DURATION_SECONDS)
        {
            return Err(AppError::Config(format!(
                "{name} must not exceed {MAX_DURATION_SECONDS} seconds"
            )));
        }
        if q.key_prefix.is_empty() || q.answer_channel.is_empty() {
            return Err(AppError::Config(
                "key_prefix and answer_channel must not be empty".into(),
            ));
        }
        if self.store.backend == StoreBackend::Redis && self.store.redis_url.is_empty() {
            return Err(AppError::Config(
                "redis_url is required for the redis backend".into(),
            ));
        }

        // Admins are always authorized.
        for admin in &self.admin_user_ids {
            if !self.authorized_user_ids.contains(admin) {
                self.authorized_user_ids.push(admin.clone());
            }
        }

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    match env::var(env_key) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(AppError::Config(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))),
    }
}
