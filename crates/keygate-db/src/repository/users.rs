//! User operations

use chrono::Utc;
use sqlx::Row;

use crate::error::DbError;
use crate::models::{NewUser, User};
use crate::repository::Database;
use crate::utils::normalize_email;

impl Database {
    /// Insert a new user
    pub async fn insert_user(&self, user: NewUser) -> Result<User, DbError> {
        let now = Utc::now();

        // Check if user already exists
        let existing = self.get_user_by_username(&user.username).await?;
        if existing.is_some() {
            return Err(DbError::DuplicateUser(user.username));
        }

        let email = normalize_email(user.email.as_deref());

        let result = sqlx::query(
            r#"
            INSERT INTO users (username, email, password_hash, active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&user.username)
        .bind(&email)
        .bind(&user.password_hash)
        .bind(user.active)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        let id: i64 = result.get("id");

        Ok(User {
            id,
            username: user.username,
            email,
            password_hash: user.password_hash,
            active: user.active,
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a user by username
    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, DbError> {
        let result = sqlx::query(
            r#"
            SELECT id, username, email, password_hash, active, created_at, updated_at
            FROM users
            WHERE username = ?
            LIMIT 1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        result.map(|row| User::try_from(&row).map_err(DbError::from)).transpose()
    }

    /// List all users
    pub async fn list_users(&self) -> Result<Vec<User>, DbError> {
        let rows = sqlx::query(
            r#"
            SELECT id, username, email, password_hash, active, created_at, updated_at
            FROM users
            ORDER BY username
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| User::try_from(row).map_err(DbError::from))
            .collect()
    }

    /// Enable or disable a user
    pub async fn set_user_active(&self, username: &str, active: bool) -> Result<(), DbError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE users
            SET active = ?, updated_at = ?
            WHERE username = ?
            "#,
        )
        .bind(active)
        .bind(now.to_rfc3339())
        .bind(username)
        .execute(&self.pool)
        .await?;
        expect_one_row(result.rows_affected(), username)
    }

    /// Update user password
    pub async fn update_user_password(&self, username: &str, password_hash: &str) -> Result<(), DbError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = ?, updated_at = ?
            WHERE username = ?
            "#,
        )
        .bind(password_hash)
        .bind(now.to_rfc3339())
        .bind(username)
        .execute(&self.pool)
        .await?;
        expect_one_row(result.rows_affected(), username)
    }

    /// Delete a user
    pub async fn delete_user(&self, username: &str) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM users WHERE username = ?")
            .bind(username)
            .execute(&self.pool)
            .await?;
        expect_one_row(result.rows_affected(), username)
    }
}

/// Map an UPDATE/DELETE that touched no rows to `UserNotFound`
fn expect_one_row(rows_affected: u64, username: &str) -> Result<(), DbError> {
    if rows_affected == 0 {
        return Err(DbError::UserNotFound(username.to_string()));
    }
    Ok(())
}
