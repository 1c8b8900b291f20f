//! Go bag repository
//!
//! Catalog items plus the per-user packed set (`go_bag_entries`).

use crate::db::DynDatabasePool;
use crate::models::{GoBagItem, GoBagItemInput, ItemCategory};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

#[async_trait]
pub trait GoBagRepository: Send + Sync {
    /// All catalog items, grouped by category then name
    async fn list_items(&self) -> Result<Vec<GoBagItem>>;

    async fn get_item(&self, id: i64) -> Result<Option<GoBagItem>>;

    /// Catalog items among `ids`; unknown ids are skipped
    async fn get_items(&self, ids: &[i64]) -> Result<Vec<GoBagItem>>;

    async fn create_item(&self, input: &GoBagItemInput) -> Result<GoBagItem>;

    async fn update_item(&self, id: i64, input: &GoBagItemInput) -> Result<Option<GoBagItem>>;

    /// Returns false when the item did not exist
    async fn delete_item(&self, id: i64) -> Result<bool>;

    /// Ids of the items a user has packed
    async fn packed_item_ids(&self, user_id: i64) -> Result<Vec<i64>>;

    /// Returns false when the item was already packed
    async fn pack(&self, user_id: i64, item_id: i64) -> Result<bool>;

    /// Returns false when the item was not packed
    async fn unpack(&self, user_id: i64, item_id: i64) -> Result<bool>;

    /// Replace the packed set in one transaction
    async fn set_packed(&self, user_id: i64, item_ids: &[i64]) -> Result<()>;
}

pub struct SqlxGoBagRepository {
    pool: DynDatabasePool,
}

impl SqlxGoBagRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn GoBagRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl GoBagRepository for SqlxGoBagRepository {
    async fn list_items(&self) -> Result<Vec<GoBagItem>> {
        let rows = sqlx::query(
            "SELECT id, name, category, description, is_essential, created_at
             FROM go_bag_items ORDER BY category, name",
        )
        .fetch_all(self.pool.sqlite())
        .await
        .context("Failed to list go bag items")?;

        Ok(rows.iter().map(row_to_item).collect())
    }

    async fn get_item(&self, id: i64) -> Result<Option<GoBagItem>> {
        get_item(self.pool.sqlite(), id).await
    }

    async fn get_items(&self, ids: &[i64]) -> Result<Vec<GoBagItem>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, name, category, description, is_essential, created_at
             FROM go_bag_items WHERE id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY id");

        let rows = builder
            .build()
            .fetch_all(self.pool.sqlite())
            .await
            .context("Failed to get go bag items")?;

        Ok(rows.iter().map(row_to_item).collect())
    }

    async fn create_item(&self, input: &GoBagItemInput) -> Result<GoBagItem> {
        let result = sqlx::query(
            "INSERT INTO go_bag_items (name, category, description, is_essential, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(input.name.trim())
        .bind(input.category.to_string())
        .bind(&input.description)
        .bind(input.is_essential)
        .bind(Utc::now())
        .execute(self.pool.sqlite())
        .await
        .context("Failed to create go bag item")?;

        get_item(self.pool.sqlite(), result.last_insert_rowid())
            .await?
            .context("Go bag item missing after insert")
    }

    async fn update_item(&self, id: i64, input: &GoBagItemInput) -> Result<Option<GoBagItem>> {
        let result = sqlx::query(
            "UPDATE go_bag_items SET name = ?, category = ?, description = ?, is_essential = ?
             WHERE id = ?",
        )
        .bind(input.name.trim())
        .bind(input.category.to_string())
        .bind(&input.description)
        .bind(input.is_essential)
        .bind(id)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to update go bag item")?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        get_item(self.pool.sqlite(), id).await
    }

    async fn delete_item(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM go_bag_items WHERE id = ?")
            .bind(id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to delete go bag item")?;
        Ok(result.rows_affected() > 0)
    }

    async fn packed_item_ids(&self, user_id: i64) -> Result<Vec<i64>> {
        let rows = sqlx::query("SELECT item_id FROM go_bag_entries WHERE user_id = ? ORDER BY item_id")
            .bind(user_id)
            .fetch_all(self.pool.sqlite())
            .await
            .context("Failed to read packed items")?;
        Ok(rows.iter().map(|r| r.get("item_id")).collect())
    }

    async fn pack(&self, user_id: i64, item_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO go_bag_entries (user_id, item_id, packed_at) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(item_id)
        .bind(Utc::now())
        .execute(self.pool.sqlite())
        .await
        .context("Failed to pack item")?;
        Ok(result.rows_affected() > 0)
    }

    async fn unpack(&self, user_id: i64, item_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM go_bag_entries WHERE user_id = ? AND item_id = ?")
            .bind(user_id)
            .bind(item_id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to unpack item")?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_packed(&self, user_id: i64, item_ids: &[i64]) -> Result<()> {
        set_packed(self.pool.sqlite(), user_id, item_ids).await
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn get_item(pool: &SqlitePool, id: i64) -> Result<Option<GoBagItem>> {
    let row = sqlx::query(
        "SELECT id, name, category, description, is_essential, created_at
         FROM go_bag_items WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get go bag item")?;

    Ok(row.as_ref().map(row_to_item))
}

async fn set_packed(pool: &SqlitePool, user_id: i64, item_ids: &[i64]) -> Result<()> {
    let mut tx = pool.begin().await?;
    let now = Utc::now();

    sqlx::query("DELETE FROM go_bag_entries WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear packed items")?;

    for item_id in item_ids {
        sqlx::query(
            "INSERT OR IGNORE INTO go_bag_entries (user_id, item_id, packed_at) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(item_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to pack item")?;
    }

    tx.commit().await.context("Failed to commit packed items")?;
    Ok(())
}

fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> GoBagItem {
    let category: String = row.get("category");
    GoBagItem {
        id: row.get("id"),
        name: row.get("name"),
        category: ItemCategory::from_str(&category).unwrap_or(ItemCategory::Other),
        description: row.get("description"),
        is_essential: row.get("is_essential"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxGoBagRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        sqlx::query("INSERT INTO users (name, email, password_hash) VALUES ('t', 't@x.ph', 'h')")
            .execute(pool.sqlite())
            .await
            .expect("Failed to create user");
        let repo = SqlxGoBagRepository::new(pool.clone());
        (pool, repo)
    }

    fn input(name: &str) -> GoBagItemInput {
        GoBagItemInput {
            name: name.to_string(),
            category: ItemCategory::Tools,
            description: "test".to_string(),
            is_essential: false,
        }
    }

    #[tokio::test]
    async fn test_seeded_catalog_listed() {
        let (_pool, repo) = setup_test_repo().await;
        let items = repo.list_items().await.unwrap();
        assert_eq!(items.len(), 14);
        assert!(items.iter().any(|i| i.category == ItemCategory::FirstAid));
    }

    #[tokio::test]
    async fn test_item_crud() {
        let (_pool, repo) = setup_test_repo().await;
        let created = repo.create_item(&input("Rope")).await.unwrap();
        assert_eq!(created.name, "Rope");

        let mut changed = input("Nylon rope");
        changed.is_essential = true;
        let updated = repo.update_item(created.id, &changed).await.unwrap().unwrap();
        assert_eq!(updated.name, "Nylon rope");
        assert!(updated.is_essential);

        assert!(repo.delete_item(created.id).await.unwrap());
        assert!(!repo.delete_item(created.id).await.unwrap());
        assert!(repo.update_item(created.id, &changed).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_name_is_unique_violation() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create_item(&input("Rope")).await.unwrap();
        let err = repo.create_item(&input("Rope")).await.unwrap_err();
        assert!(crate::db::is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_pack_unpack() {
        let (_pool, repo) = setup_test_repo().await;
        assert!(repo.pack(1, 1).await.unwrap());
        assert!(!repo.pack(1, 1).await.unwrap());
        assert!(repo.pack(1, 3).await.unwrap());
        assert_eq!(repo.packed_item_ids(1).await.unwrap(), vec![1, 3]);

        assert!(repo.unpack(1, 1).await.unwrap());
        assert!(!repo.unpack(1, 1).await.unwrap());
        assert_eq!(repo.packed_item_ids(1).await.unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn test_set_packed_replaces_set() {
        let (_pool, repo) = setup_test_repo().await;
        repo.pack(1, 1).await.unwrap();
        repo.set_packed(1, &[2, 4, 4]).await.unwrap();
        assert_eq!(repo.packed_item_ids(1).await.unwrap(), vec![2, 4]);

        repo.set_packed(1, &[]).await.unwrap();
        assert!(repo.packed_item_ids(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_items_skips_unknown() {
        let (_pool, repo) = setup_test_repo().await;
        let items = repo.get_items(&[1, 2, 999]).await.unwrap();
        assert_eq!(items.len(), 2);
        assert!(repo.get_items(&[]).await.unwrap().is_empty());
    }
}
