//! Refresh token storage on the user row.
//!
//! Each user holds at most one refresh token. Attaching a new one overwrites
//! the previous value, which revokes any older session. Access tokens are
//! stateless and never stored.

use sqlx::sqlite::SqlitePool;

use super::user::{User, UserRow};

/// Store for the single active refresh token of each user.
#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Replace the user's stored refresh token. Last writer wins.
    pub async fn attach_refresh_token(
        &self,
        user_id: i64,
        token: &str,
        expires_at: i64,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE users SET refresh_token = ?, refresh_expires_at = ? WHERE id = ?")
                .bind(token)
                .bind(expires_at)
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Find the user whose stored refresh token is exactly `token`.
    pub async fn find_by_refresh_token(&self, token: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, uuid, user_name, email, password_hash, role, refresh_token
             FROM users WHERE refresh_token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Clear the stored refresh token of a user.
    pub async fn clear_refresh_token(&self, user_id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET refresh_token = NULL, refresh_expires_at = NULL
             WHERE id = ? AND refresh_token IS NOT NULL",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Clear the stored refresh token of whichever user currently holds `token`.
    pub async fn clear_refresh_token_value(&self, token: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET refresh_token = NULL, refresh_expires_at = NULL
             WHERE refresh_token = ?",
        )
        .bind(token)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Clear every stored refresh token that expired before `now` (Unix seconds).
    pub async fn clear_expired(&self, now: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET refresh_token = NULL, refresh_expires_at = NULL
             WHERE refresh_expires_at IS NOT NULL AND refresh_expires_at <= ?",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
