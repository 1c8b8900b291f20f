//! User repository
//!
//! Database operations for users.
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite

use crate::db::DynDatabasePool;
use crate::models::{ListParams, Location, User, UserListFilter, UserRole, UserStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create(&self, user: &User) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get user by email (case-insensitive)
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Update profile, role, status, avatar and password hash
    async fn update(&self, user: &User) -> Result<User>;

    /// Delete a user
    async fn delete(&self, id: i64) -> Result<()>;

    /// Count total users
    async fn count(&self) -> Result<i64>;

    /// List users matching a filter, newest first
    async fn list(&self, filter: &UserListFilter, params: &ListParams) -> Result<(Vec<User>, i64)>;

    /// Atomically add points to a user's balance
    async fn add_points(&self, id: i64, delta: i64) -> Result<()>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        create_user(self.pool.sqlite(), user).await
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        get_user_by_id(self.pool.sqlite(), id).await
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        get_user_by_email(self.pool.sqlite(), email).await
    }

    async fn update(&self, user: &User) -> Result<User> {
        update_user(self.pool.sqlite(), user).await
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to delete user")?;
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM users")
            .fetch_one(self.pool.sqlite())
            .await
            .context("Failed to count users")?;
        Ok(row.get("count"))
    }

    async fn list(&self, filter: &UserListFilter, params: &ListParams) -> Result<(Vec<User>, i64)> {
        list_users(self.pool.sqlite(), filter, params).await
    }

    async fn add_points(&self, id: i64, delta: i64) -> Result<()> {
        sqlx::query("UPDATE users SET points = points + ?, updated_at = ? WHERE id = ?")
            .bind(delta)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to add points")?;
        Ok(())
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

const USER_COLUMNS: &str = "id, name, email, password_hash, role, status, province, city, barangay, \
     points, avatar_url, avatar_public_id, created_at, updated_at";

async fn create_user(pool: &SqlitePool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (name, email, password_hash, role, status, province, city, barangay,
                           points, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
        "#,
    )
    .bind(&user.name)
    .bind(user.email.to_lowercase())
    .bind(&user.password_hash)
    .bind(user.role.to_string())
    .bind(user.status.to_string())
    .bind(&user.location.province)
    .bind(&user.location.city)
    .bind(&user.location.barangay)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_rowid(),
        email: user.email.to_lowercase(),
        points: 0,
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

async fn get_user_by_id(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    row.map(|r| row_to_user(&r)).transpose()
}

async fn get_user_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(email.trim().to_lowercase())
        .fetch_optional(pool)
        .await
        .context("Failed to get user by email")?;

    row.map(|r| row_to_user(&r)).transpose()
}

async fn update_user(pool: &SqlitePool, user: &User) -> Result<User> {
    let now = Utc::now();

    sqlx::query(
        r#"
        UPDATE users
        SET name = ?, password_hash = ?, role = ?, status = ?, province = ?, city = ?,
            barangay = ?, avatar_url = ?, avatar_public_id = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&user.name)
    .bind(&user.password_hash)
    .bind(user.role.to_string())
    .bind(user.status.to_string())
    .bind(&user.location.province)
    .bind(&user.location.city)
    .bind(&user.location.barangay)
    .bind(&user.avatar_url)
    .bind(&user.avatar_public_id)
    .bind(now)
    .bind(user.id)
    .execute(pool)
    .await
    .context("Failed to update user")?;

    get_user_by_id(pool, user.id)
        .await?
        .context("User not found after update")
}

async fn list_users(
    pool: &SqlitePool,
    filter: &UserListFilter,
    params: &ListParams,
) -> Result<(Vec<User>, i64)> {
    let role = filter.role.map(|r| r.to_string());
    let province = filter.province.as_deref().map(str::trim).filter(|p| !p.is_empty());
    let city = filter.city.as_deref().map(str::trim).filter(|c| !c.is_empty());
    let search = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s.to_lowercase()));

    // NULL parameters switch the corresponding filter off
    let conditions = r#"
        (?1 IS NULL OR role = ?1)
        AND (?2 IS NULL OR city = ?2 COLLATE NOCASE)
        AND (?3 IS NULL OR LOWER(name) LIKE ?3 OR LOWER(email) LIKE ?3)
        AND (?4 IS NULL OR province = ?4 COLLATE NOCASE)
    "#;

    let sql = format!(
        "SELECT {} FROM users WHERE {} ORDER BY created_at DESC, id DESC LIMIT ?5 OFFSET ?6",
        USER_COLUMNS, conditions
    );
    let rows = sqlx::query(&sql)
        .bind(&role)
        .bind(city)
        .bind(&search)
        .bind(province)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list users")?;

    let users = rows.iter().map(row_to_user).collect::<Result<Vec<_>>>()?;

    let count_sql = format!("SELECT COUNT(*) as count FROM users WHERE {}", conditions);
    let total: i64 = sqlx::query(&count_sql)
        .bind(&role)
        .bind(city)
        .bind(&search)
        .bind(province)
        .fetch_one(pool)
        .await
        .context("Failed to count users")?
        .get("count");

    Ok((users, total))
}

pub(crate) fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let role_str: String = row.get("role");
    let role = UserRole::from_str(&role_str).unwrap_or_default();
    let status_str: String = row.get("status");
    let status = UserStatus::from_str(&status_str).unwrap_or_default();

    Ok(User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role,
        status,
        location: Location {
            province: row.get("province"),
            city: row.get("city"),
            barangay: row.get("barangay"),
        },
        points: row.get("points"),
        avatar_url: row.get("avatar_url"),
        avatar_public_id: row.get("avatar_public_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxUserRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxUserRepository::new(pool.clone());
        (pool, repo)
    }

    fn create_test_user(name: &str, email: &str, city: &str) -> User {
        User::new(
            name.to_string(),
            email.to_string(),
            "hash".to_string(),
            UserRole::Citizen,
            Location::new("Albay", city, "Centro"),
        )
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let (_pool, repo) = setup_test_repo().await;
        let created = repo
            .create(&create_test_user("Maria", "Maria@Example.ph", "Legazpi"))
            .await
            .expect("Failed to create user");

        assert!(created.id > 0);
        assert_eq!(created.email, "maria@example.ph");

        let found = repo
            .get_by_email("MARIA@example.ph")
            .await
            .unwrap()
            .expect("User not found");
        assert_eq!(found.id, created.id);
        assert_eq!(found.location.city, "Legazpi");
        assert_eq!(found.role, UserRole::Citizen);
    }

    #[tokio::test]
    async fn test_get_user_by_id_not_found() {
        let (_pool, repo) = setup_test_repo().await;
        assert!(repo.get_by_id(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unique_email_constraint() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&create_test_user("A", "dup@example.ph", "Legazpi"))
            .await
            .unwrap();
        let err = repo
            .create(&create_test_user("B", "dup@example.ph", "Legazpi"))
            .await
            .expect_err("duplicate email must fail");
        assert!(crate::db::is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_update_user() {
        let (_pool, repo) = setup_test_repo().await;
        let mut user = repo
            .create(&create_test_user("Ana", "ana@example.ph", "Legazpi"))
            .await
            .unwrap();

        user.role = UserRole::Lgu;
        user.status = UserStatus::Banned;
        user.avatar_url = Some("/uploads/a.png".to_string());
        let updated = repo.update(&user).await.unwrap();

        assert_eq!(updated.role, UserRole::Lgu);
        assert!(updated.is_banned());
        assert_eq!(updated.avatar_url.as_deref(), Some("/uploads/a.png"));
    }

    #[tokio::test]
    async fn test_add_points_is_incremental() {
        let (_pool, repo) = setup_test_repo().await;
        let user = repo
            .create(&create_test_user("Ben", "ben@example.ph", "Legazpi"))
            .await
            .unwrap();

        repo.add_points(user.id, 30).await.unwrap();
        repo.add_points(user.id, 20).await.unwrap();

        let found = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(found.points, 50);
    }

    #[tokio::test]
    async fn test_list_with_filters() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&create_test_user("Carla", "carla@example.ph", "Legazpi"))
            .await
            .unwrap();
        repo.create(&create_test_user("Dario", "dario@example.ph", "Daraga"))
            .await
            .unwrap();
        let mut lgu = repo
            .create(&create_test_user("Elena", "elena@example.ph", "Legazpi"))
            .await
            .unwrap();
        lgu.role = UserRole::Lgu;
        repo.update(&lgu).await.unwrap();

        let params = ListParams::default();

        let (all, total) = repo.list(&UserListFilter::default(), &params).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(total, 3);

        let by_city = UserListFilter {
            city: Some("legazpi".to_string()),
            ..Default::default()
        };
        let (_, total) = repo.list(&by_city, &params).await.unwrap();
        assert_eq!(total, 2);

        let by_role = UserListFilter {
            role: Some(UserRole::Lgu),
            ..Default::default()
        };
        let (users, _) = repo.list(&by_role, &params).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].name, "Elena");

        let by_search = UserListFilter {
            search: Some("DARIO".to_string()),
            ..Default::default()
        };
        let (users, _) = repo.list(&by_search, &params).await.unwrap();
        assert_eq!(users.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_and_count() {
        let (_pool, repo) = setup_test_repo().await;
        let user = repo
            .create(&create_test_user("Fe", "fe@example.ph", "Legazpi"))
            .await
            .unwrap();
        assert_eq!(repo.count().await.unwrap(), 1);

        repo.delete(user.id).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 0);
    }
}
