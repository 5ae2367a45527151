//! Slack interaction dispatch handler.
//!
//! Receives button presses via Socket Mode and routes answer buttons to
//! the question resolver. Presses from unknown or inactive users are
//! dropped with a security log; every other failure is logged and the
//! interaction is acknowledged regardless.

use std::sync::Arc;

use slack_morphism::prelude::{
    SlackClient, SlackClientEventsUserState, SlackClientHyperHttpsConnector,
    SlackInteractionEvent,
};
use tracing::{info, info_span, warn, Instrument};

use crate::models::question::QuestionRecord;
use crate::question::fanout;
use crate::slack::blocks;
use crate::state::AppState;
use crate::transport::AnswerCallback;
use crate::{AppError, Result};

/// Resolve an answer button press from `user_id`.
///
/// `display_name` is the name Slack reported for the presser; when present
/// it is recorded on the user and used in the announcement. On success the
/// buttons are removed from every delivered copy of the question and a
/// threaded reply names the answerer. Announcement failures are logged and
/// do not undo the answer.
///
/// # Errors
///
/// - `AppError::Unauthorized` if the user is unknown or inactive.
/// - `AppError::InvalidInput` if the button payload is malformed.
/// - Any resolver error (`NotFound`, `NotReady`, `InvalidAnswer`,
///   `AlreadyAnswered`, `Store`).
pub async fn handle_answer(
    state: &AppState,
    user_id: &str,
    display_name: Option<&str>,
    payload: &str,
) -> Result<QuestionRecord> {
    let users = state.users();
    let mut user = match users.get_by_id(user_id).await? {
        Some(user) if user.active => user,
        _ => {
            warn!(user_id, "unauthorized user attempted to answer a question");
            return Err(AppError::Unauthorized(format!("user {user_id} is not active")));
        }
    };

    if let Some(name) = display_name.map(str::trim).filter(|n| !n.is_empty()) {
        if name != user.display_name {
            users.update_display_name(user_id, name).await?;
            name.clone_into(&mut user.display_name);
        }
    }

    let callback = AnswerCallback::decode(payload)?;
    let span = info_span!("answer_button", random_id = %callback.random_id, user_id);

    async {
        let record = state
            .questions
            .answer(&callback.random_id, user_id, &callback.data)
            .await?;
        info!(data = %callback.data, "question answered from slack");

        if let Some(messenger) = state.messenger.as_deref() {
            let announced =
                fanout::announce_answer(messenger, &record, &user.greet(), &state.shutdown).await;
            if let Err(err) = announced {
                warn!(%err, "failed to announce answer");
            }
        }
        Ok(record)
    }
    .instrument(span)
    .await
}

/// Handle interactive payloads delivered via Socket Mode.
///
/// # Errors
///
/// Never fails; handler errors are logged so that Slack always receives
/// an acknowledgement.
pub async fn handle_interaction(
    event: SlackInteractionEvent,
    _client: Arc<SlackClient<SlackClientHyperHttpsConnector>>,
    state: SlackClientEventsUserState,
) -> slack_morphism::UserCallbackResult<()> {
    let app_state: Option<Arc<AppState>> = {
        let guard = state.read().await;
        guard.get_user_state::<Arc<AppState>>().cloned()
    };

    let SlackInteractionEvent::BlockActions(block_event) = &event else {
        info!(?event, "unhandled interaction event type");
        return Ok(());
    };

    let Some(ref app) = app_state else {
        warn!("app state not available; cannot process interaction");
        return Ok(());
    };

    let Some(user) = block_event.user.as_ref() else {
        warn!("block action without user; ignoring");
        return Ok(());
    };
    let user_id = user.id.to_string();
    let display_name = user.name.as_deref().or(user.username.as_deref());

    for action in block_event.actions.iter().flatten() {
        let action_id = action.action_id.to_string();
        if !blocks::is_answer_action(&action_id) {
            warn!(action_id, "unknown action_id");
            continue;
        }

        let Some(value) = action.value.as_deref() else {
            warn!(action_id, user_id, "answer action without value");
            continue;
        };

        info!(action_id, user_id, "dispatching answer action");
        match handle_answer(app, &user_id, display_name, value).await {
            Ok(_) => {}
            Err(err) if err.is_user_error() => {
                info!(%err, user_id, "answer rejected");
            }
            Err(err) => warn!(%err, user_id, "answer action failed"),
        }
    }

    Ok(())
}
