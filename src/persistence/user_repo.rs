//! User repository for `SQLite` persistence.

use std::sync::Arc;

use crate::models::channel::Channel;
use crate::models::user::User;
use crate::Result;

use super::channel_repo::ChannelRow;
use super::db::Database;
use super::parse_timestamp;

/// Repository wrapper around `SQLite` for user records.
#[derive(Clone)]
pub struct UserRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    display_name: String,
    active: bool,
    admin: bool,
    created_at: String,
}

impl UserRow {
    fn into_user(self) -> Result<User> {
        Ok(User {
            id: self.id,
            display_name: self.display_name,
            active: self.active,
            admin: self.admin,
            created_at: parse_timestamp(&self.created_at, "created_at")?,
        })
    }
}

impl UserRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a user or update the flags of an existing one.
    ///
    /// An empty `display_name` never overwrites a known name.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the database write fails.
    pub async fn upsert(&self, user: &User) -> Result<()> {
        sqlx::query(
            "INSERT INTO user (id, display_name, active, admin, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                active = excluded.active,
                admin = excluded.admin,
                display_name = CASE WHEN excluded.display_name = ''
                    THEN user.display_name ELSE excluded.display_name END",
        )
        .bind(&user.id)
        .bind(&user.display_name)
        .bind(user.active)
        .bind(user.admin)
        .bind(user.created_at.to_rfc3339())
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Activate every configured user, marking the admins.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if any write fails.
    pub async fn seed(&self, authorized: &[String], admins: &[String]) -> Result<()> {
        for id in authorized {
            let user = User::new(id.clone(), admins.contains(id));
            self.upsert(&user).await?;
        }
        Ok(())
    }

    /// Retrieve a user by identifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as("SELECT * FROM user WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.db.as_ref())
            .await?;

        row.map(UserRow::into_user).transpose()
    }

    /// Record the display name last seen for a known user.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn update_display_name(&self, id: &str, display_name: &str) -> Result<()> {
        sqlx::query("UPDATE user SET display_name = ?1 WHERE id = ?2")
            .bind(display_name)
            .bind(id)
            .execute(self.db.as_ref())
            .await?;
        Ok(())
    }

    /// Live channels the user is subscribed to, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_subscriptions(&self, id: &str) -> Result<Vec<Channel>> {
        let rows: Vec<ChannelRow> = sqlx::query_as(
            "SELECT c.* FROM channel c
             JOIN subscription s ON s.channel_id = c.id
             WHERE s.user_id = ?1 AND c.deleted_at IS NULL
             ORDER BY c.name",
        )
        .bind(id)
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(ChannelRow::into_channel).collect()
    }
}
