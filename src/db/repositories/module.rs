//! Learning module repository

use crate::db::DynDatabasePool;
use crate::models::{ListParams, Module, ModuleCompletion};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait ModuleRepository: Send + Sync {
    async fn create(&self, module: &Module) -> Result<Module>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Module>>;

    /// Newest first; drafts only when `include_drafts`
    async fn list(&self, include_drafts: bool, params: &ListParams) -> Result<(Vec<Module>, i64)>;

    async fn update(&self, module: &Module) -> Result<Module>;

    async fn delete(&self, id: i64) -> Result<bool>;

    async fn set_published(&self, id: i64, published: bool) -> Result<bool>;

    /// Record a completion and award `points` the first time only
    async fn complete(&self, user_id: i64, module_id: i64, points: i64) -> Result<ModuleCompletion>;

    /// Module ids the user has completed
    async fn completed_by(&self, user_id: i64) -> Result<Vec<i64>>;
}

pub struct SqlxModuleRepository {
    pool: DynDatabasePool,
}

impl SqlxModuleRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ModuleRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ModuleRepository for SqlxModuleRepository {
    async fn create(&self, module: &Module) -> Result<Module> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO modules (title, summary, content, content_html, category, points,
                                 is_published, created_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&module.title)
        .bind(&module.summary)
        .bind(&module.content)
        .bind(&module.content_html)
        .bind(&module.category)
        .bind(module.points)
        .bind(module.is_published)
        .bind(module.created_by)
        .bind(now)
        .bind(now)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to create module")?;

        Ok(Module {
            id: result.last_insert_rowid(),
            created_at: now,
            updated_at: now,
            ..module.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Module>> {
        get_module_by_id(self.pool.sqlite(), id).await
    }

    async fn list(&self, include_drafts: bool, params: &ListParams) -> Result<(Vec<Module>, i64)> {
        let rows = sqlx::query(
            "SELECT id, title, summary, content, content_html, category, points, is_published,
                    created_by, created_at, updated_at
             FROM modules WHERE (? OR is_published = 1)
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        )
        .bind(include_drafts)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(self.pool.sqlite())
        .await
        .context("Failed to list modules")?;

        let total: i64 = sqlx::query("SELECT COUNT(*) as count FROM modules WHERE (? OR is_published = 1)")
            .bind(include_drafts)
            .fetch_one(self.pool.sqlite())
            .await
            .context("Failed to count modules")?
            .get("count");

        Ok((rows.iter().map(row_to_module).collect(), total))
    }

    async fn update(&self, module: &Module) -> Result<Module> {
        sqlx::query(
            r#"
            UPDATE modules
            SET title = ?, summary = ?, content = ?, content_html = ?, category = ?, points = ?,
                is_published = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&module.title)
        .bind(&module.summary)
        .bind(&module.content)
        .bind(&module.content_html)
        .bind(&module.category)
        .bind(module.points)
        .bind(module.is_published)
        .bind(Utc::now())
        .bind(module.id)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to update module")?;

        get_module_by_id(self.pool.sqlite(), module.id)
            .await?
            .context("Module not found after update")
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM modules WHERE id = ?")
            .bind(id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to delete module")?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_published(&self, id: i64, published: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE modules SET is_published = ?, updated_at = ? WHERE id = ?")
            .bind(published)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to change module publication")?;
        Ok(result.rows_affected() > 0)
    }

    async fn complete(&self, user_id: i64, module_id: i64, points: i64) -> Result<ModuleCompletion> {
        complete_module(self.pool.sqlite(), user_id, module_id, points).await
    }

    async fn completed_by(&self, user_id: i64) -> Result<Vec<i64>> {
        let rows = sqlx::query("SELECT module_id FROM module_completions WHERE user_id = ? ORDER BY module_id")
            .bind(user_id)
            .fetch_all(self.pool.sqlite())
            .await
            .context("Failed to list completions")?;
        Ok(rows.iter().map(|r| r.get("module_id")).collect())
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn get_module_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Module>> {
    let row = sqlx::query(
        "SELECT id, title, summary, content, content_html, category, points, is_published,
                created_by, created_at, updated_at
         FROM modules WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get module by ID")?;

    Ok(row.as_ref().map(row_to_module))
}

async fn complete_module(
    pool: &SqlitePool,
    user_id: i64,
    module_id: i64,
    points: i64,
) -> Result<ModuleCompletion> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO module_completions (user_id, module_id, points_awarded, completed_at)
         VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(module_id)
    .bind(points)
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("Failed to record completion")?
    .rows_affected()
        > 0;

    if !inserted {
        let completed_at: DateTime<Utc> = sqlx::query(
            "SELECT completed_at FROM module_completions WHERE user_id = ? AND module_id = ?",
        )
        .bind(user_id)
        .bind(module_id)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to read completion")?
        .get("completed_at");
        tx.commit().await?;
        return Ok(ModuleCompletion {
            module_id,
            points_awarded: 0,
            first_completion: false,
            completed_at,
        });
    }

    if points > 0 {
        sqlx::query("UPDATE users SET points = points + ?, updated_at = ? WHERE id = ?")
            .bind(points)
            .bind(now)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("Failed to award module points")?;
    }

    tx.commit().await.context("Failed to commit completion")?;
    Ok(ModuleCompletion {
        module_id,
        points_awarded: points,
        first_completion: true,
        completed_at: now,
    })
}

fn row_to_module(row: &sqlx::sqlite::SqliteRow) -> Module {
    Module {
        id: row.get("id"),
        title: row.get("title"),
        summary: row.get("summary"),
        content: row.get("content"),
        content_html: row.get("content_html"),
        category: row.get("category"),
        points: row.get("points"),
        is_published: row.get("is_published"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup() -> (DynDatabasePool, SqlxModuleRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.unwrap();
        sqlx::query("INSERT INTO users (name, email, password_hash) VALUES ('t', 't@x.ph', 'h')")
            .execute(pool.sqlite())
            .await
            .unwrap();
        (pool.clone(), SqlxModuleRepository::new(pool))
    }

    fn module(title: &str, published: bool) -> Module {
        let now = Utc::now();
        Module {
            id: 0,
            title: title.to_string(),
            summary: String::new(),
            content: "Stay indoors".to_string(),
            content_html: "<p>Stay indoors</p>".to_string(),
            category: "typhoon".to_string(),
            points: 15,
            is_published: published,
            created_by: Some(1),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_list_hides_drafts() {
        let (_pool, repo) = setup().await;
        repo.create(&module("Published", true)).await.unwrap();
        repo.create(&module("Draft", false)).await.unwrap();

        let params = ListParams::default();
        let (public, total) = repo.list(false, &params).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(public[0].title, "Published");

        let (_, total) = repo.list(true, &params).await.unwrap();
        assert_eq!(total, 2);
    }

    #[tokio::test]
    async fn test_complete_awards_once() {
        let (pool, repo) = setup().await;
        let created = repo.create(&module("Earthquake drill", true)).await.unwrap();

        let first = repo.complete(1, created.id, 15).await.unwrap();
        let second = repo.complete(1, created.id, 15).await.unwrap();
        assert_eq!(first.points_awarded, 15);
        assert!(first.first_completion);
        assert_eq!(second.points_awarded, 0);
        assert!(!second.first_completion);

        let points: i64 = sqlx::query("SELECT points FROM users WHERE id = 1")
            .fetch_one(pool.sqlite())
            .await
            .unwrap()
            .get("points");
        assert_eq!(points, 15);
        assert_eq!(repo.completed_by(1).await.unwrap(), vec![created.id]);
    }

    #[tokio::test]
    async fn test_update_and_unpublish() {
        let (_pool, repo) = setup().await;
        let mut created = repo.create(&module("Flood", true)).await.unwrap();
        created.title = "Flood safety".to_string();
        let updated = repo.update(&created).await.unwrap();
        assert_eq!(updated.title, "Flood safety");

        assert!(repo.set_published(created.id, false).await.unwrap());
        let stored = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert!(!stored.is_published);

        assert!(repo.delete(created.id).await.unwrap());
        assert!(repo.get_by_id(created.id).await.unwrap().is_none());
    }
}
