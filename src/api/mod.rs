//! JSON HTTP API for producers.
//!
//! Every route except `/health` requires `Authorization: Bearer <token>`.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod models;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use error::ApiError;

use crate::state::AppState;
use crate::{AppError, Result};

/// Build the API router over `state`.
pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/notify", post(handlers::notify))
        .route("/question", post(handlers::create_question))
        .route("/question/{id}", get(handlers::get_question))
        .route("/question/{id}/poll", get(handlers::poll_question))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_token,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(protected)
        .with_state(state)
}

/// Serve the API on `listener` until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Io` if the server fails.
pub async fn serve(state: Arc<AppState>, listener: TcpListener, ct: CancellationToken) -> Result<()> {
    let addr = listener
        .local_addr()
        .map_err(|err| AppError::Io(format!("failed to read bound address: {err}")))?;
    info!(%addr, "starting HTTP API");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Io(format!("http server error: {err}")))?;

    info!("HTTP API shut down");
    Ok(())
}
