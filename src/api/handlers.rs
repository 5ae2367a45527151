//! Handlers for the producer-facing endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/notify` | Body: [`NotifyRequest`]; needs the `notify` capability |
//! | `POST` | `/question` | Body: [`QuestionRequest`]; returns 201 + id |
//! | `GET`  | `/question/{id}` | Current state of an own question |
//! | `GET`  | `/question/{id}/poll` | Long-poll; 204 when nothing arrived |

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{info, info_span, Instrument};

use super::error::ApiError;
use super::models::{
    NotifyRequest, NotifyResponse, QuestionRequest, QuestionResponse, UserRepr,
};
use crate::models::channel::Channel;
use crate::models::question::{QuestionOption, QuestionRecord};
use crate::models::token::{Capability, Token};
use crate::question::{fanout, WaitOutcome};
use crate::state::AppState;
use crate::transport::Messenger;
use crate::validation::{validate_question, validate_text};
use crate::AppError;

/// `GET /health`
pub async fn health() -> &'static str {
    "ok"
}

fn require(token: &Token, capability: Capability) -> Result<(), ApiError> {
    if token.can(capability) {
        Ok(())
    } else {
        Err(ApiError::capability_disallowed())
    }
}

fn messenger(state: &AppState) -> Result<&dyn Messenger, ApiError> {
    state
        .messenger
        .as_deref()
        .ok_or_else(|| AppError::Slack("messaging is not configured".into()).into())
}

/// Resolve `name` to a live channel the token may target.
async fn target_channel(
    state: &AppState,
    token: &Token,
    name: &str,
) -> Result<Channel, ApiError> {
    if token.allowed_channel(name).is_none() {
        return Err(ApiError::channel_not_found());
    }
    state
        .channels()
        .get_by_name(name)
        .await?
        .ok_or_else(ApiError::channel_not_found)
}

fn message_text(token: &Token, channel: &Channel, text: &str) -> String {
    format!("[{} -> {}]\n\n{}", token.name, channel.name, text)
}

/// Cancellation scoped to one request: fires on server shutdown, or when
/// the returned guard drops because the client went away.
fn request_cancel(state: &AppState) -> (CancellationToken, DropGuard) {
    let cancel = state.shutdown.child_token();
    let guard = cancel.clone().drop_guard();
    (cancel, guard)
}

async fn to_response(
    state: &AppState,
    record: &QuestionRecord,
) -> Result<QuestionResponse, ApiError> {
    let by = match &record.answer {
        Some(answer) if record.is_answered() => state
            .users()
            .get_by_id(&answer.answerer_id)
            .await?
            .as_ref()
            .map(UserRepr::from),
        _ => None,
    };
    Ok(QuestionResponse::from_record(record, by))
}

/// Read a question, hiding those created by other tokens.
async fn own_question(
    state: &AppState,
    token: &Token,
    id: &str,
) -> Result<QuestionRecord, ApiError> {
    let record = state.questions.read(id).await?;
    if record.source_id == token.source_id() {
        Ok(record)
    } else {
        Err(ApiError::NotFound(None))
    }
}

/// `POST /notify`
pub async fn notify(
    State(state): State<Arc<AppState>>,
    Extension(token): Extension<Token>,
    Json(body): Json<NotifyRequest>,
) -> Result<Json<NotifyResponse>, ApiError> {
    require(&token, Capability::Notify)?;
    validate_text(&body.text)?;
    let channel = target_channel(&state, &token, &body.channel).await?;

    let (cancel, _guard) = request_cancel(&state);
    let span = info_span!("notify", token = %token.name, channel = %channel.name);
    let delivered = async {
        let text = message_text(&token, &channel, &body.text);
        let delivered =
            fanout::notify(messenger(&state)?, &channel.subscribers, &text, &cancel).await?;
        info!(delivered, "notification sent");
        Ok::<_, ApiError>(delivered)
    }
    .instrument(span)
    .await?;

    Ok(Json(NotifyResponse {
        delivered_to_anyone: delivered,
    }))
}

/// `POST /question`
pub async fn create_question(
    State(state): State<Arc<AppState>>,
    Extension(token): Extension<Token>,
    Json(body): Json<QuestionRequest>,
) -> Result<Response, ApiError> {
    require(&token, Capability::Question)?;
    let options: Vec<QuestionOption> = body.options.into_iter().map(Into::into).collect();
    validate_question(&body.text, &options)?;

    let channel = target_channel(&state, &token, &body.channel).await?;
    if channel.subscribers.is_empty() {
        return Err(ApiError::BadRequest("no subscribers on this channel".into()));
    }

    let (cancel, _guard) = request_cancel(&state);
    let span = info_span!("create_question", token = %token.name, channel = %channel.name);
    let id = async {
        let text = message_text(&token, &channel, &body.text);
        let id = fanout::ask(
            &state.questions,
            messenger(&state)?,
            &token.source_id(),
            &channel.subscribers,
            &text,
            &options,
            cancel,
        )
        .await?;
        info!(random_id = %id, options = options.len(), "question created");
        Ok::<_, ApiError>(id)
    }
    .instrument(span)
    .await?;

    Ok((StatusCode::CREATED, Json(QuestionResponse::pending(id))).into_response())
}

/// `GET /question/{id}`
pub async fn get_question(
    State(state): State<Arc<AppState>>,
    Extension(token): Extension<Token>,
    Path(id): Path<String>,
) -> Result<Json<QuestionResponse>, ApiError> {
    require(&token, Capability::Question)?;
    let record = own_question(&state, &token, &id).await?;
    Ok(Json(to_response(&state, &record).await?))
}

/// `GET /question/{id}/poll`
pub async fn poll_question(
    State(state): State<Arc<AppState>>,
    Extension(token): Extension<Token>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require(&token, Capability::Question)?;
    let record = own_question(&state, &token, &id).await?;
    if record.is_answered() {
        return Ok(Json(to_response(&state, &record).await?).into_response());
    }

    let (cancel, _guard) = request_cancel(&state);
    let timeout = state.questions.settings().poll_timeout;
    let outcome = state
        .questions
        .wait_for_answer(&id, timeout, cancel)
        .instrument(info_span!("poll_question", random_id = %id, token = %token.name))
        .await?;

    match outcome {
        WaitOutcome::Answered(record) => {
            Ok(Json(to_response(&state, &record).await?).into_response())
        }
        WaitOutcome::TimedOut | WaitOutcome::Cancelled => {
            Ok(StatusCode::NO_CONTENT.into_response())
        }
    }
}
