//! Ephemeral question lifecycle.
//!
//! A question is created by a producer through [`NewQuestionTx`], fanned
//! out to subscribers, answered exactly once by any recipient, and read or
//! long-polled by the producer until its record expires from the store.
//!
//! [`QuestionService`] owns the injected store handle and the timing
//! settings; the lifecycle operations live in the submodules as `impl`
//! blocks on it.

pub mod builder;
pub mod codec;
pub mod fanout;
pub mod reader;
pub mod resolver;
pub mod waiter;

use std::sync::Arc;
use std::time::Duration;

use crate::config::QuestionConfig;
use crate::store::EphemeralStore;

pub use builder::NewQuestionTx;
pub use waiter::WaitOutcome;

/// Lifecycle timings and store naming used by [`QuestionService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionSettings {
    /// Lifetime of a record that was never closed.
    pub inflight_ttl: Duration,
    /// Lifetime of a closed or answered record.
    pub answered_ttl: Duration,
    /// Default long-poll duration.
    pub poll_timeout: Duration,
    /// Prefix of every record key.
    pub key_prefix: String,
    /// Pub/sub channel carrying answer wakeups.
    pub answer_channel: String,
}

impl Default for QuestionSettings {
    fn default() -> Self {
        Self::from(&QuestionConfig::default())
    }
}

impl From<&QuestionConfig> for QuestionSettings {
    fn from(config: &QuestionConfig) -> Self {
        Self {
            inflight_ttl: config.inflight_ttl(),
            answered_ttl: config.answered_ttl(),
            poll_timeout: config.poll_timeout(),
            key_prefix: config.key_prefix.clone(),
            answer_channel: config.answer_channel.clone(),
        }
    }
}

/// Entry point for question creation, answering, reading and waiting.
#[derive(Clone)]
pub struct QuestionService {
    store: Arc<dyn EphemeralStore>,
    settings: Arc<QuestionSettings>,
}

impl QuestionService {
    /// Create a service over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn EphemeralStore>, settings: QuestionSettings) -> Self {
        Self {
            store,
            settings: Arc::new(settings),
        }
    }

    /// Active settings.
    #[must_use]
    pub fn settings(&self) -> &QuestionSettings {
        &self.settings
    }

    fn key(&self, random_id: &str) -> String {
        codec::record_key(&self.settings.key_prefix, random_id)
    }
}
