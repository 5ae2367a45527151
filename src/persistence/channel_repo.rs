//! Channel and subscription repository for `SQLite` persistence.
//!
//! Deleted channels are soft-deleted: the row stays so that its name can
//! never be claimed again, but it disappears from every lookup.

use std::sync::Arc;

use chrono::Utc;

use crate::models::channel::Channel;
use crate::{AppError, Result};

use super::db::Database;
use super::{is_unique_violation, parse_timestamp};

/// Repository wrapper around `SQLite` for channels and subscriptions.
#[derive(Clone)]
pub struct ChannelRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
pub(super) struct ChannelRow {
    id: i64,
    name: String,
    creator_id: Option<String>,
    created_at: String,
}

impl ChannelRow {
    pub(super) fn into_channel(self) -> Result<Channel> {
        Ok(Channel {
            id: self.id,
            name: self.name,
            creator_id: self.creator_id,
            created_at: parse_timestamp(&self.created_at, "created_at")?,
            subscribers: Vec::new(),
        })
    }
}

impl ChannelRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create a channel named `name`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AlreadyExists` if any channel, live or deleted,
    /// ever used the name, or `AppError::Db` on other failures.
    pub async fn create(&self, name: &str, creator_id: Option<&str>) -> Result<Channel> {
        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO channel (name, creator_id, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(name)
        .bind(creator_id)
        .bind(created_at.to_rfc3339())
        .execute(self.db.as_ref())
        .await;

        match result {
            Ok(done) => Ok(Channel {
                id: done.last_insert_rowid(),
                name: name.to_owned(),
                creator_id: creator_id.map(str::to_owned),
                created_at,
                subscribers: Vec::new(),
            }),
            Err(err) if is_unique_violation(&err) => Err(AppError::AlreadyExists(format!(
                "channel name {name} is used by a current or past channel"
            ))),
            Err(err) => Err(err.into()),
        }
    }

    /// Look up a live channel by name, including its subscribers.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_name(&self, name: &str) -> Result<Option<Channel>> {
        let row: Option<ChannelRow> =
            sqlx::query_as("SELECT * FROM channel WHERE name = ?1 AND deleted_at IS NULL")
                .bind(name)
                .fetch_optional(self.db.as_ref())
                .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut channel = row.into_channel()?;
        channel.subscribers = self.subscribers(channel.id).await?;
        Ok(Some(channel))
    }

    /// Subscriber user ids of `channel_id`, restricted to active users.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn subscribers(&self, channel_id: i64) -> Result<Vec<String>> {
        let ids: Vec<(String,)> = sqlx::query_as(
            "SELECT s.user_id FROM subscription s
             JOIN user u ON u.id = s.user_id
             WHERE s.channel_id = ?1 AND u.active = 1
             ORDER BY s.user_id",
        )
        .bind(channel_id)
        .fetch_all(self.db.as_ref())
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    /// All live channels ordered by name, without subscribers.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list(&self) -> Result<Vec<Channel>> {
        let rows: Vec<ChannelRow> =
            sqlx::query_as("SELECT * FROM channel WHERE deleted_at IS NULL ORDER BY name")
                .fetch_all(self.db.as_ref())
                .await?;

        rows.into_iter().map(ChannelRow::into_channel).collect()
    }

    /// Soft-delete the live channel named `name` and drop its
    /// subscriptions and token grants.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if no live channel has that name, or
    /// `AppError::Db` on failure.
    pub async fn delete_by_name(&self, name: &str) -> Result<()> {
        let mut tx = self.db.begin().await?;

        let id: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM channel WHERE name = ?1 AND deleted_at IS NULL")
                .bind(name)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((id,)) = id else {
            return Err(AppError::NotFound(format!("channel {name}")));
        };

        sqlx::query("UPDATE channel SET deleted_at = ?1 WHERE id = ?2")
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM subscription WHERE channel_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM token_channel WHERE channel_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Subscribe or unsubscribe `user_id` to `channel_id`.
    ///
    /// Returns whether anything changed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the write fails.
    pub async fn change_subscription(
        &self,
        user_id: &str,
        channel_id: i64,
        subscribed: bool,
    ) -> Result<bool> {
        let done = if subscribed {
            sqlx::query(
                "INSERT OR IGNORE INTO subscription (user_id, channel_id) VALUES (?1, ?2)",
            )
            .bind(user_id)
            .bind(channel_id)
            .execute(self.db.as_ref())
            .await?
        } else {
            sqlx::query("DELETE FROM subscription WHERE user_id = ?1 AND channel_id = ?2")
                .bind(user_id)
                .bind(channel_id)
                .execute(self.db.as_ref())
                .await?
        };
        Ok(done.rows_affected() > 0)
    }
}
