//! Shared fixtures for integration tests.
//!
//! Provides an in-memory `AppState`, a recording [`Messenger`] fake and a
//! seeded channel/token layout so test modules can focus on behaviour.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use question_relay::config::GlobalConfig;
use question_relay::models::question::RelatedMessage;
use question_relay::models::token::Capability;
use question_relay::persistence::db;
use question_relay::persistence::token_repo::hash_secret;
use question_relay::persistence::user_repo::UserRepo;
use question_relay::question::{QuestionService, QuestionSettings};
use question_relay::state::AppState;
use question_relay::store::memory::MemoryStore;
use question_relay::transport::{Button, Messenger, MessengerFuture};
use question_relay::AppError;
use tokio_util::sync::CancellationToken;

pub const ADMIN: &str = "UADMIN";
pub const ALICE: &str = "U555";
pub const BOB: &str = "U999";
pub const CHANNEL: &str = "backups";

/// Secret of a token allowed to notify and ask on [`CHANNEL`].
pub const CRON_SECRET: &str = "cron-secret";
/// Secret of a notify-only token on [`CHANNEL`].
pub const NOTIFIER_SECRET: &str = "notifier-secret";
/// Secret of a second question token on [`CHANNEL`].
pub const OTHER_SECRET: &str = "other-secret";

/// A message handed to [`RecordingMessenger::send`].
#[derive(Debug, Clone)]
pub struct Sent {
    pub recipient: String,
    pub text: String,
    pub buttons: Vec<Button>,
    pub message: RelatedMessage,
}

/// [`Messenger`] fake that records every call.
#[derive(Default)]
pub struct RecordingMessenger {
    next_id: AtomicUsize,
    /// Fail every send once this many have succeeded.
    pub fail_after: Option<usize>,
    pub sent: Mutex<Vec<Sent>>,
    pub removed: Mutex<Vec<RelatedMessage>>,
    pub replies: Mutex<Vec<(RelatedMessage, String)>>,
}

impl RecordingMessenger {
    pub fn failing_after(sends: usize) -> Self {
        Self {
            fail_after: Some(sends),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().expect("lock").clone()
    }

    pub fn removed(&self) -> Vec<RelatedMessage> {
        self.removed.lock().expect("lock").clone()
    }

    pub fn replies(&self) -> Vec<(RelatedMessage, String)> {
        self.replies.lock().expect("lock").clone()
    }
}

impl Messenger for RecordingMessenger {
    fn send(
        &self,
        recipient: &str,
        text: &str,
        buttons: &[Button],
        _cancel: &CancellationToken,
    ) -> MessengerFuture<'_, RelatedMessage> {
        let recipient = recipient.to_owned();
        let text = text.to_owned();
        let buttons = buttons.to_vec();
        Box::pin(async move {
            let mut sent = self.sent.lock().expect("lock");
            if self.fail_after.is_some_and(|limit| sent.len() >= limit) {
                return Err(AppError::Slack(format!("send to {recipient} refused")));
            }
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let message = RelatedMessage::new(format!("{id}.000"), recipient.clone());
            sent.push(Sent {
                recipient,
                text,
                buttons,
                message: message.clone(),
            });
            Ok(message)
        })
    }

    fn remove_buttons(&self, message: &RelatedMessage) -> MessengerFuture<'_, RelatedMessage> {
        let message = message.clone();
        Box::pin(async move {
            self.removed.lock().expect("lock").push(message.clone());
            Ok(message)
        })
    }

    fn reply(
        &self,
        message: &RelatedMessage,
        text: &str,
        _cancel: &CancellationToken,
    ) -> MessengerFuture<'_, ()> {
        let message = message.clone();
        let text = text.to_owned();
        Box::pin(async move {
            self.replies.lock().expect("lock").push((message, text));
            Ok(())
        })
    }
}

/// Settings with a short long-poll so 204 paths finish quickly.
pub fn test_settings() -> QuestionSettings {
    QuestionSettings {
        poll_timeout: Duration::from_millis(300),
        ..QuestionSettings::default()
    }
}

/// Build an `AppState` over in-memory stores.
///
/// Seeds an admin plus [`ALICE`] and [`BOB`], creates [`CHANNEL`] with both
/// users subscribed, and three tokens (see the `*_SECRET` constants).
pub async fn test_state(messenger: Option<Arc<dyn Messenger>>) -> Arc<AppState> {
    let db = Arc::new(db::connect_memory().await.expect("db"));
    UserRepo::new(Arc::clone(&db))
        .seed(
            &[ADMIN.to_owned(), ALICE.to_owned(), BOB.to_owned()],
            &[ADMIN.to_owned()],
        )
        .await
        .expect("seed");

    let state = Arc::new(AppState {
        config: Arc::new(GlobalConfig::from_toml_str("").expect("config")),
        db,
        questions: QuestionService::new(Arc::new(MemoryStore::new()), test_settings()),
        messenger,
        shutdown: CancellationToken::new(),
    });

    let channel = state
        .channels()
        .create(CHANNEL, Some(ADMIN))
        .await
        .expect("channel");
    for user in [ALICE, BOB] {
        state
            .channels()
            .change_subscription(user, channel.id, true)
            .await
            .expect("subscribe");
    }

    let channels = vec![CHANNEL.to_owned()];
    for (name, secret, caps) in [
        ("cron", CRON_SECRET, &[Capability::Notify, Capability::Question][..]),
        ("notifier", NOTIFIER_SECRET, &[Capability::Notify][..]),
        ("other", OTHER_SECRET, &[Capability::Question][..]),
    ] {
        state
            .tokens()
            .create(name, &hash_secret(secret), &channels, caps)
            .await
            .expect("token");
    }

    state
}

/// Build an `AppState` with a fresh [`RecordingMessenger`].
pub async fn recording_state() -> (Arc<AppState>, Arc<RecordingMessenger>) {
    let messenger = Arc::new(RecordingMessenger::default());
    let state = test_state(Some(Arc::clone(&messenger) as Arc<dyn Messenger>)).await;
    (state, messenger)
}
