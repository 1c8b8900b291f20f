//! Session repository
//!
//! Database operations for login sessions and password reset codes.
//!
//! This module provides:
//! - `SessionRepository` trait defining the interface for session data access
//! - `SqlxSessionRepository` implementing the trait for SQLite

use crate::db::DynDatabasePool;
use crate::models::{PasswordReset, Session};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Create a new session
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Get session by ID (token)
    async fn get_by_id(&self, id: &str) -> Result<Option<Session>>;

    /// Delete a session
    async fn delete(&self, id: &str) -> Result<()>;

    /// Delete all sessions for a user
    async fn delete_by_user(&self, user_id: i64) -> Result<()>;

    /// Delete all sessions for a user except `keep`
    async fn delete_others(&self, user_id: i64, keep: &str) -> Result<u64>;

    /// Delete expired sessions
    async fn delete_expired(&self) -> Result<i64>;

    /// Store (or replace) the reset code for an email
    async fn put_reset(&self, reset: &PasswordReset) -> Result<()>;

    /// Fetch the reset code for an email
    async fn get_reset(&self, email: &str) -> Result<Option<PasswordReset>>;

    /// Remove the reset code for an email
    async fn delete_reset(&self, email: &str) -> Result<()>;

    /// Delete expired reset codes
    async fn delete_expired_resets(&self) -> Result<i64>;
}

/// SQLx-based session repository implementation
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    /// Create a new SQLx session repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        create_session(self.pool.sqlite(), session).await
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        get_session_by_id(self.pool.sqlite(), id).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to delete sessions by user")?;
        Ok(())
    }

    async fn delete_others(&self, user_id: i64, keep: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = ? AND id != ?")
            .bind(user_id)
            .bind(keep)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to delete other sessions")?;
        Ok(result.rows_affected())
    }

    async fn delete_expired(&self) -> Result<i64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
            .bind(Utc::now())
            .execute(self.pool.sqlite())
            .await
            .context("Failed to delete expired sessions")?;
        Ok(result.rows_affected() as i64)
    }

    async fn put_reset(&self, reset: &PasswordReset) -> Result<()> {
        put_reset(self.pool.sqlite(), reset).await
    }

    async fn get_reset(&self, email: &str) -> Result<Option<PasswordReset>> {
        let row = sqlx::query("SELECT email, code, expires_at FROM password_resets WHERE email = ?")
            .bind(email.trim().to_lowercase())
            .fetch_optional(self.pool.sqlite())
            .await
            .context("Failed to get password reset")?;

        Ok(row.map(|row| PasswordReset {
            email: row.get("email"),
            code: row.get("code"),
            expires_at: row.get("expires_at"),
        }))
    }

    async fn delete_reset(&self, email: &str) -> Result<()> {
        sqlx::query("DELETE FROM password_resets WHERE email = ?")
            .bind(email.trim().to_lowercase())
            .execute(self.pool.sqlite())
            .await
            .context("Failed to delete password reset")?;
        Ok(())
    }

    async fn delete_expired_resets(&self) -> Result<i64> {
        let result = sqlx::query("DELETE FROM password_resets WHERE expires_at < ?")
            .bind(Utc::now())
            .execute(self.pool.sqlite())
            .await
            .context("Failed to delete expired password resets")?;
        Ok(result.rows_affected() as i64)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_session(pool: &SqlitePool, session: &Session) -> Result<Session> {
    sqlx::query(
        r#"
        INSERT INTO sessions (id, user_id, expires_at, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&session.id)
    .bind(session.user_id)
    .bind(session.expires_at)
    .bind(session.created_at)
    .execute(pool)
    .await
    .context("Failed to create session")?;

    Ok(session.clone())
}

async fn get_session_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Session>> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, expires_at, created_at
        FROM sessions
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get session by ID")?;

    Ok(row.map(|row| Session {
        id: row.get("id"),
        user_id: row.get("user_id"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    }))
}

async fn put_reset(pool: &SqlitePool, reset: &PasswordReset) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO password_resets (email, code, expires_at, created_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(email) DO UPDATE SET
            code = excluded.code,
            expires_at = excluded.expires_at,
            created_at = excluded.created_at
        "#,
    )
    .bind(reset.email.trim().to_lowercase())
    .bind(&reset.code)
    .bind(reset.expires_at)
    .bind(Utc::now())
    .execute(pool)
    .await
    .context("Failed to store password reset")?;

    Ok(())
}
