//! Slack Socket Mode client and [`Messenger`] implementation.

use std::sync::Arc;
use std::time::Duration;

use slack_morphism::errors::SlackClientError;
use slack_morphism::prelude::{
    SlackApiChatPostMessageRequest, SlackApiChatUpdateRequest,
    SlackApiConversationsHistoryRequest, SlackApiToken, SlackApiTokenType, SlackApiTokenValue,
    SlackBlock, SlackChannelId, SlackClient, SlackClientEventsListenerEnvironment,
    SlackClientHyperHttpsConnector, SlackClientSession, SlackClientSocketModeConfig,
    SlackClientSocketModeListener, SlackHistoryMessage, SlackMessageContent,
    SlackSocketModeListenerCallbacks, SlackTs,
};
use tokio::{task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::models::question::RelatedMessage;
use crate::slack::{blocks, commands, events};
use crate::state::AppState;
use crate::transport::{Button, Messenger, MessengerFuture};
use crate::{config::SlackConfig, AppError, Result};

const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);
const MAX_SEND_ATTEMPTS: u32 = 5;

/// Delay before retrying a failed post, or `None` when the failure must
/// not be retried.
///
/// Only rate limiting is retried; Slack's `retry_after` wins over the
/// local backoff.
#[must_use]
pub fn retry_delay(error: &SlackClientError, backoff: Duration) -> Option<Duration> {
    match error {
        SlackClientError::RateLimitError(rate) => Some(rate.retry_after.unwrap_or(backoff)),
        _ => None,
    }
}

fn content(text: Option<String>, blocks: Option<Vec<SlackBlock>>) -> SlackMessageContent {
    SlackMessageContent {
        text,
        markdown_text: None,
        blocks,
        attachments: None,
        upload: None,
        files: None,
        reactions: None,
        metadata: None,
    }
}

fn post_request(
    channel: SlackChannelId,
    text: &str,
    blocks: Vec<SlackBlock>,
    thread_ts: Option<SlackTs>,
) -> SlackApiChatPostMessageRequest {
    SlackApiChatPostMessageRequest {
        channel,
        // Fallback text for notifications; the blocks carry the layout.
        content: content(Some(text.to_owned()), Some(blocks)),
        as_user: None,
        icon_emoji: None,
        icon_url: None,
        link_names: Some(true),
        parse: None,
        thread_ts,
        username: None,
        reply_broadcast: None,
        unfurl_links: None,
        unfurl_media: None,
    }
}

/// Slack Web API and Socket Mode wrapper.
pub struct SlackService {
    client: Arc<SlackClient<SlackClientHyperHttpsConnector>>,
    bot_token: SlackApiToken,
    app_token: SlackApiToken,
}

impl SlackService {
    /// Create the Slack client from configured credentials.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Slack` if the HTTPS connector cannot be created,
    /// or `AppError::Config` if either token is missing.
    pub fn new(config: &SlackConfig) -> Result<Self> {
        if !config.is_configured() {
            return Err(AppError::Config(
                "slack app and bot tokens are both required".into(),
            ));
        }
        let connector = SlackClientHyperHttpsConnector::new()
            .map_err(|err| AppError::Slack(format!("failed to init slack connector: {err}")))?;
        let client = Arc::new(SlackClient::new(connector));
        let bot_token = SlackApiToken {
            token_value: SlackApiTokenValue(config.bot_token.clone()),
            cookie: None,
            team_id: None,
            scope: None,
            token_type: Some(SlackApiTokenType::Bot),
        };
        let app_token = SlackApiToken {
            token_value: SlackApiTokenValue(config.app_token.clone()),
            cookie: None,
            team_id: None,
            scope: None,
            token_type: Some(SlackApiTokenType::App),
        };

        Ok(Self {
            client,
            bot_token,
            app_token,
        })
    }

    /// Start the Socket Mode listener that receives slash commands and
    /// button presses. The listener stops when `state.shutdown` fires.
    #[must_use]
    pub fn spawn_socket_mode(&self, state: Arc<AppState>) -> JoinHandle<()> {
        let shutdown = state.shutdown.clone();
        let listener_env = Arc::new(
            SlackClientEventsListenerEnvironment::new(Arc::clone(&self.client))
                .with_error_handler(|err, _client, _state| {
                    error!(?err, "socket mode error");
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR
                })
                .with_user_state(state),
        );
        let callbacks = SlackSocketModeListenerCallbacks::new()
            .with_hello_events(|event, _client, _state| async move {
                info!(?event, "socket hello");
            })
            .with_command_events(commands::handle_command)
            .with_interaction_events(events::handle_interaction)
            .with_push_events(|event, _client, _state| async move {
                info!(?event, "push event ignored");
                Ok(())
            });
        let config = SlackClientSocketModeConfig {
            max_connections_count: SlackClientSocketModeConfig::DEFAULT_CONNECTIONS_COUNT,
            debug_connections: SlackClientSocketModeConfig::DEFAULT_DEBUG_CONNECTIONS,
            initial_backoff_in_seconds:
                SlackClientSocketModeConfig::DEFAULT_INITIAL_BACKOFF_IN_SECONDS,
            reconnect_timeout_in_seconds:
                SlackClientSocketModeConfig::DEFAULT_RECONNECT_TIMEOUT_IN_SECONDS,
            ping_interval_in_seconds: SlackClientSocketModeConfig::DEFAULT_PING_INTERVAL_IN_SECONDS,
            ping_failure_threshold_times:
                SlackClientSocketModeConfig::DEFAULT_PING_FAILURE_THRESHOLD_TIMES,
        };

        let listener = SlackClientSocketModeListener::new(&config, listener_env, callbacks);
        let app_token = self.app_token.clone();
        tokio::spawn(async move {
            if let Err(error) = listener.listen_for(&app_token).await {
                error!(?error, "socket mode listen failed");
                return;
            }

            tokio::select! {
                _ = listener.serve() => info!("socket mode listener exited"),
                () = shutdown.cancelled() => {
                    listener.shutdown().await;
                    info!("socket mode listener stopped");
                }
            }
        })
    }

    /// Create an HTTP session for direct API calls using the bot token.
    #[must_use]
    pub fn http_session(&self) -> SlackClientSession<'_, SlackClientHyperHttpsConnector> {
        self.client.open_session(&self.bot_token)
    }

    /// Post a message, backing off while Slack reports rate limiting.
    ///
    /// `chat.postMessage` is not idempotent, so any other failure is
    /// returned as-is: Slack may already have accepted the message.
    async fn post_with_retry(
        &self,
        request: &SlackApiChatPostMessageRequest,
        cancel: &CancellationToken,
    ) -> Result<RelatedMessage> {
        let session = self.http_session();
        let mut backoff = INITIAL_RETRY_DELAY;
        let mut attempt = 1;
        loop {
            let error = match session.chat_post_message(request).await {
                Ok(response) => {
                    return Ok(RelatedMessage::new(
                        response.ts.to_string(),
                        response.channel.to_string(),
                    ));
                }
                Err(error) => error,
            };

            let delay = match retry_delay(&error, backoff) {
                Some(delay) if attempt < MAX_SEND_ATTEMPTS => delay,
                _ => return Err(AppError::Slack(format!("failed to post message: {error}"))),
            };
            warn!(?error, delay = ?delay, attempt, "slack rate limited; retrying");

            tokio::select! {
                () = cancel.cancelled() => {
                    return Err(AppError::Cancelled(
                        "slack post cancelled during backoff".into(),
                    ));
                }
                () = sleep(delay) => {}
            }
            backoff = (backoff * 2).min(MAX_RETRY_DELAY);
            attempt += 1;
        }
    }

    /// Fetch a single message by its timestamp.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Slack` if the Slack API call fails, or
    /// `AppError::NotFound` if the message no longer exists.
    pub async fn fetch_message(
        &self,
        channel: SlackChannelId,
        ts: SlackTs,
    ) -> Result<SlackHistoryMessage> {
        let request = SlackApiConversationsHistoryRequest {
            channel: Some(channel),
            cursor: None,
            latest: Some(ts.clone()),
            limit: Some(1),
            oldest: None,
            inclusive: Some(true),
            include_all_metadata: None,
        };

        let messages = self
            .http_session()
            .conversations_history(&request)
            .await
            .map(|response| response.messages)
            .map_err(|err| AppError::Slack(format!("failed to read history: {err}")))?;

        messages
            .into_iter()
            .find(|message| message.origin.ts == ts)
            .ok_or_else(|| AppError::NotFound(format!("slack message {ts}")))
    }

    /// Replace the body of an existing Slack message.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Slack` if the Slack API call fails.
    pub async fn update_message(
        &self,
        channel: SlackChannelId,
        ts: SlackTs,
        text: Option<String>,
        blocks: Vec<SlackBlock>,
    ) -> Result<RelatedMessage> {
        let request = SlackApiChatUpdateRequest::new(channel, content(text, Some(blocks)), ts);
        let response = self
            .http_session()
            .chat_update(&request)
            .await
            .map_err(|err| AppError::Slack(format!("failed to update message: {err}")))?;
        Ok(RelatedMessage::new(
            response.ts.to_string(),
            response.channel.to_string(),
        ))
    }
}

impl Messenger for SlackService {
    fn send(
        &self,
        recipient: &str,
        text: &str,
        buttons: &[Button],
        cancel: &CancellationToken,
    ) -> MessengerFuture<'_, RelatedMessage> {
        // Posting to a user id delivers into the bot's direct conversation.
        let request = post_request(
            SlackChannelId(recipient.to_owned()),
            text,
            blocks::question_blocks(text, buttons),
            None,
        );
        let cancel = cancel.clone();
        Box::pin(async move { self.post_with_retry(&request, &cancel).await })
    }

    fn remove_buttons(&self, message: &RelatedMessage) -> MessengerFuture<'_, RelatedMessage> {
        let channel = SlackChannelId(message.chat_id.clone());
        let ts = SlackTs(message.message_id.clone());
        Box::pin(async move {
            let original = self.fetch_message(channel.clone(), ts.clone()).await?;
            let remaining = blocks::without_actions(original.content.blocks.unwrap_or_default());
            self.update_message(channel, ts, original.content.text, remaining)
                .await
        })
    }

    fn reply(
        &self,
        message: &RelatedMessage,
        text: &str,
        cancel: &CancellationToken,
    ) -> MessengerFuture<'_, ()> {
        let request = post_request(
            SlackChannelId(message.chat_id.clone()),
            text,
            vec![blocks::text_section(text)],
            Some(SlackTs(message.message_id.clone())),
        );
        let cancel = cancel.clone();
        Box::pin(async move {
            self.post_with_retry(&request, &cancel).await?;
            Ok(())
        })
    }
}
