//! Process-wide application state shared by the HTTP API and Slack
//! callbacks.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::GlobalConfig;
use crate::persistence::channel_repo::ChannelRepo;
use crate::persistence::db::Database;
use crate::persistence::token_repo::TokenRepo;
use crate::persistence::user_repo::UserRepo;
use crate::question::QuestionService;
use crate::transport::Messenger;

/// Shared state handed to every request handler.
pub struct AppState {
    /// Validated configuration.
    pub config: Arc<GlobalConfig>,
    /// Relational store for users, channels and tokens.
    pub db: Arc<Database>,
    /// Ephemeral question lifecycle.
    pub questions: QuestionService,
    /// Outbound messaging; `None` in local-only mode.
    pub messenger: Option<Arc<dyn Messenger>>,
    /// Fires when the server shuts down.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// User repository over the shared pool.
    #[must_use]
    pub fn users(&self) -> UserRepo {
        UserRepo::new(Arc::clone(&self.db))
    }

    /// Channel repository over the shared pool.
    #[must_use]
    pub fn channels(&self) -> ChannelRepo {
        ChannelRepo::new(Arc::clone(&self.db))
    }

    /// Token repository over the shared pool.
    #[must_use]
    pub fn tokens(&self) -> TokenRepo {
        TokenRepo::new(Arc::clone(&self.db))
    }
}
