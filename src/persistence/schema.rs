//! `SQLite` schema bootstrap logic.
//!
//! All table definitions use `CREATE TABLE IF NOT EXISTS`, so the
//! bootstrap is safe to re-run on every server startup.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table definitions to the connected `SQLite` database.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS user (
    id              TEXT PRIMARY KEY NOT NULL,
    display_name    TEXT NOT NULL DEFAULT '',
    active          INTEGER NOT NULL DEFAULT 0,
    admin           INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS channel (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    name            TEXT NOT NULL UNIQUE CHECK(length(name) <= 48),
    creator_id      TEXT,
    created_at      TEXT NOT NULL,
    deleted_at      TEXT
);

CREATE TABLE IF NOT EXISTS subscription (
    user_id         TEXT NOT NULL REFERENCES user(id) ON DELETE CASCADE,
    channel_id      INTEGER NOT NULL REFERENCES channel(id) ON DELETE CASCADE,
    PRIMARY KEY (user_id, channel_id)
);

CREATE TABLE IF NOT EXISTS token (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    name            TEXT NOT NULL UNIQUE CHECK(length(name) <= 48),
    token_hash      BLOB NOT NULL UNIQUE,
    cap_notify      INTEGER NOT NULL DEFAULT 0,
    cap_question    INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL,
    last_used       TEXT
);

CREATE TABLE IF NOT EXISTS token_channel (
    token_id        INTEGER NOT NULL REFERENCES token(id) ON DELETE CASCADE,
    channel_id      INTEGER NOT NULL REFERENCES channel(id) ON DELETE CASCADE,
    PRIMARY KEY (token_id, channel_id)
);

CREATE INDEX IF NOT EXISTS idx_subscription_channel ON subscription(channel_id);
CREATE INDEX IF NOT EXISTS idx_token_channel_channel ON token_channel(channel_id);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
