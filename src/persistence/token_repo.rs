//! API token repository for `SQLite` persistence.
//!
//! Token secrets are never stored; only their SHA-256 hash is kept and
//! compared on authentication.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::token::{AllowedChannel, Capability, Token};
use crate::{AppError, Result};

use super::db::Database;
use super::{is_unique_violation, parse_timestamp};

/// Length of generated token secrets.
const SECRET_LEN: usize = 48;

/// SHA-256 digest of a token secret.
#[must_use]
pub fn hash_secret(secret: &str) -> Vec<u8> {
    Sha256::digest(secret.as_bytes()).to_vec()
}

/// Generate a new random token secret.
#[must_use]
pub fn generate_secret() -> String {
    let mut secret = String::with_capacity(64);
    secret.push_str(&Uuid::new_v4().simple().to_string());
    secret.push_str(&Uuid::new_v4().simple().to_string());
    secret.truncate(SECRET_LEN);
    secret
}

/// Repository wrapper around `SQLite` for API tokens.
#[derive(Clone)]
pub struct TokenRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct TokenRow {
    id: i64,
    name: String,
    cap_notify: bool,
    cap_question: bool,
    created_at: String,
    last_used: Option<String>,
}

impl TokenRow {
    fn into_token(self, allowed_channels: Vec<AllowedChannel>) -> Result<Token> {
        let last_used = self
            .last_used
            .as_deref()
            .map(|s| parse_timestamp(s, "last_used"))
            .transpose()?;

        Ok(Token {
            id: self.id,
            name: self.name,
            cap_notify: self.cap_notify,
            cap_question: self.cap_question,
            created_at: parse_timestamp(&self.created_at, "created_at")?,
            last_used,
            allowed_channels,
        })
    }
}

impl TokenRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create a token allowed to target `channel_names` with `capabilities`.
    ///
    /// # Errors
    ///
    /// - `AppError::NotFound` if any named channel does not exist.
    /// - `AppError::AlreadyExists` if the token name is taken.
    /// - `AppError::Db` on other failures.
    pub async fn create(
        &self,
        name: &str,
        secret_hash: &[u8],
        channel_names: &[String],
        capabilities: &[Capability],
    ) -> Result<Token> {
        let wanted: BTreeSet<&str> = channel_names.iter().map(String::as_str).collect();
        let mut tx = self.db.begin().await?;

        let mut allowed = Vec::with_capacity(wanted.len());
        for channel in &wanted {
            let row: Option<(i64, String)> = sqlx::query_as(
                "SELECT id, name FROM channel WHERE name = ?1 AND deleted_at IS NULL",
            )
            .bind(*channel)
            .fetch_optional(&mut *tx)
            .await?;
            let Some((id, name)) = row else {
                return Err(AppError::NotFound(format!("channel {channel}")));
            };
            allowed.push(AllowedChannel { id, name });
        }

        let created_at = Utc::now();
        let cap_notify = capabilities.contains(&Capability::Notify);
        let cap_question = capabilities.contains(&Capability::Question);
        let inserted = sqlx::query(
            "INSERT INTO token (name, token_hash, cap_notify, cap_question, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(name)
        .bind(secret_hash)
        .bind(cap_notify)
        .bind(cap_question)
        .bind(created_at.to_rfc3339())
        .execute(&mut *tx)
        .await;

        let token_id = match inserted {
            Ok(done) => done.last_insert_rowid(),
            Err(err) if is_unique_violation(&err) => {
                return Err(AppError::AlreadyExists(format!("token name {name}")));
            }
            Err(err) => return Err(err.into()),
        };

        for channel in &allowed {
            sqlx::query("INSERT INTO token_channel (token_id, channel_id) VALUES (?1, ?2)")
                .bind(token_id)
                .bind(channel.id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(Token {
            id: token_id,
            name: name.to_owned(),
            cap_notify,
            cap_question,
            created_at,
            last_used: None,
            allowed_channels: allowed,
        })
    }

    /// All tokens ordered by name, with their allowed channels.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list(&self) -> Result<Vec<Token>> {
        let rows: Vec<TokenRow> = sqlx::query_as(
            "SELECT id, name, cap_notify, cap_question, created_at, last_used
             FROM token ORDER BY name",
        )
        .fetch_all(self.db.as_ref())
        .await?;

        let mut tokens = Vec::with_capacity(rows.len());
        for row in rows {
            let channels = self.allowed_channels(row.id).await?;
            tokens.push(row.into_token(channels)?);
        }
        Ok(tokens)
    }

    /// Delete the token named `name`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if no token has that name, or
    /// `AppError::Db` on failure.
    pub async fn delete_by_name(&self, name: &str) -> Result<()> {
        let mut tx = self.db.begin().await?;

        let id: Option<(i64,)> = sqlx::query_as("SELECT id FROM token WHERE name = ?1")
            .bind(name)
            .fetch_optional(&mut *tx)
            .await?;
        let Some((id,)) = id else {
            return Err(AppError::NotFound(format!("token {name}")));
        };

        sqlx::query("DELETE FROM token_channel WHERE token_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM token WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Resolve a token by the hash of its secret and record the use.
    ///
    /// Returns `Ok(None)` for an unknown secret.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query or update fails.
    pub async fn authenticate(&self, secret_hash: &[u8]) -> Result<Option<Token>> {
        let row: Option<TokenRow> = sqlx::query_as(
            "SELECT id, name, cap_notify, cap_question, created_at, last_used
             FROM token WHERE token_hash = ?1",
        )
        .bind(secret_hash)
        .fetch_optional(self.db.as_ref())
        .await?;

        let Some(mut row) = row else {
            return Ok(None);
        };

        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE token SET last_used = ?1 WHERE id = ?2")
            .bind(&now)
            .bind(row.id)
            .execute(self.db.as_ref())
            .await?;
        row.last_used = Some(now);

        let channels = self.allowed_channels(row.id).await?;
        row.into_token(channels).map(Some)
    }

    async fn allowed_channels(&self, token_id: i64) -> Result<Vec<AllowedChannel>> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT c.id, c.name FROM channel c
             JOIN token_channel tc ON tc.channel_id = c.id
             WHERE tc.token_id = ?1 AND c.deleted_at IS NULL
             ORDER BY c.name",
        )
        .bind(token_id)
        .fetch_all(self.db.as_ref())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name)| AllowedChannel { id, name })
            .collect())
    }
}
