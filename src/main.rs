#![forbid(unsafe_code)]

//! `question-relay` server binary.
//!
//! Bootstraps configuration, the relational and ephemeral stores, the Slack
//! Socket Mode integration and the producer HTTP API.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use question_relay::config::GlobalConfig;
use question_relay::persistence::db;
use question_relay::persistence::user_repo::UserRepo;
use question_relay::question::{QuestionService, QuestionSettings};
use question_relay::slack::client::SlackService;
use question_relay::state::AppState;
use question_relay::store::{self, memory};
use question_relay::transport::Messenger;
use question_relay::{api, AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "question-relay", about = "Slack question relay server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("question-relay server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;

    if let Err(err) = config.load_credentials().await {
        warn!(%err, "slack credentials unavailable; running in local-only mode");
    }

    let config = Arc::new(config);
    info!("configuration loaded");

    // ── Initialize database ─────────────────────────────
    let db = Arc::new(db::connect(&config.database_path).await?);
    UserRepo::new(Arc::clone(&db))
        .seed(&config.authorized_user_ids, &config.admin_user_ids)
        .await?;
    info!(
        users = config.authorized_user_ids.len(),
        "database connected and users seeded"
    );

    // ── Ephemeral question store ────────────────────────
    let ct = CancellationToken::new();
    let (question_store, memory_store) = store::from_config(&config).await?;
    let reaper_handle = memory_store.map(|store| {
        memory::spawn_reaper(store, config.questions.reaper_interval(), ct.clone())
    });
    info!(backend = ?config.store.backend, "question store ready");

    let questions = QuestionService::new(
        question_store,
        QuestionSettings::from(&config.questions),
    );

    // ── Slack ───────────────────────────────────────────
    let slack = if config.slack.is_configured() {
        let service = SlackService::new(&config.slack).map_err(|err| {
            error!(%err, "slack service start failed");
            err
        })?;
        Some(Arc::new(service))
    } else {
        info!("slack not configured; running in local-only mode");
        None
    };

    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        db,
        questions,
        messenger: slack
            .as_ref()
            .map(|svc| Arc::clone(svc) as Arc<dyn Messenger>),
        shutdown: ct.clone(),
    });

    let socket_handle = slack
        .as_ref()
        .map(|svc| svc.spawn_socket_mode(Arc::clone(&state)));

    // ── HTTP API ────────────────────────────────────────
    let listener = TcpListener::bind(config.http_bind.as_str())
        .await
        .map_err(|err| AppError::Io(format!("failed to bind {}: {err}", config.http_bind)))?;

    let api_ct = ct.clone();
    let api_state = Arc::clone(&state);
    let api_handle = tokio::spawn(async move {
        if let Err(err) = api::serve(api_state, listener, api_ct).await {
            error!(%err, "http api failed");
        }
    });

    info!("question-relay ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    // ── Wait for background tasks ───────────────────────
    if let Err(err) = api_handle.await {
        error!(%err, "http api task panicked");
    }
    for handle in [socket_handle, reaper_handle].into_iter().flatten() {
        if let Err(err) = handle.await {
            error!(%err, "background task panicked");
        }
    }
    info!("question-relay shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
