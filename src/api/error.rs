//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::AppError;

/// An error returned by an API handler.
#[derive(Debug)]
pub enum ApiError {
    /// 404; the optional reason becomes the body.
    NotFound(Option<String>),
    /// 400 with `{"reason"}`.
    BadRequest(String),
    /// 403 with `{"reason"}`.
    Forbidden(String),
    /// 401 with no body.
    Unauthorized,
    /// 500 with `{"error"}`.
    Internal(String),
}

impl ApiError {
    /// The token lacks the capability the route needs.
    #[must_use]
    pub fn capability_disallowed() -> Self {
        Self::Forbidden("capability disallowed".into())
    }

    /// The channel is unknown or not granted to the token.
    #[must_use]
    pub fn channel_not_found() -> Self {
        Self::NotFound(Some("channel not found or no permission".into()))
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::NotFound(_) => Self::NotFound(None),
            AppError::InvalidInput(reason)
            | AppError::NotReady(reason)
            | AppError::InvalidAnswer(reason)
            | AppError::AlreadyAnswered(reason)
            | AppError::AlreadyExists(reason) => Self::BadRequest(reason),
            AppError::Forbidden(reason) => Self::Forbidden(reason),
            AppError::Unauthorized(_) => Self::Unauthorized,
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound(None) => StatusCode::NOT_FOUND.into_response(),
            Self::NotFound(Some(reason)) => {
                (StatusCode::NOT_FOUND, Json(json!({ "reason": reason }))).into_response()
            }
            Self::BadRequest(reason) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "reason": reason }))).into_response()
            }
            Self::Forbidden(reason) => {
                (StatusCode::FORBIDDEN, Json(json!({ "reason": reason }))).into_response()
            }
            Self::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
            Self::Internal(message) => {
                error!(%message, "internal error while serving request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": message })),
                )
                    .into_response()
            }
        }
    }
}
