//! Go bag service
//!
//! The item catalog is shared by everyone and cached; each user's packed
//! set is read fresh so progress is never stale.

use crate::cache::{CacheLayer, SharedCache, CATALOG_KEY};
use crate::db::repositories::GoBagRepository;
use crate::models::{GoBag, GoBagItem, GoBagItemInput};
use crate::services::error::{ServiceError, ServiceResult};
use anyhow::Context;
use std::collections::BTreeSet;
use std::sync::Arc;

const MAX_ITEM_NAME_LENGTH: usize = 100;

pub struct GoBagService {
    repo: Arc<dyn GoBagRepository>,
    cache: SharedCache,
}

impl GoBagService {
    pub fn new(repo: Arc<dyn GoBagRepository>, cache: SharedCache) -> Self {
        Self { repo, cache }
    }

    /// Catalog, grouped by category then name
    pub async fn list_items(&self) -> ServiceResult<Vec<GoBagItem>> {
        match self.cache.get::<Vec<GoBagItem>>(CATALOG_KEY).await {
            Ok(Some(items)) => return Ok(items),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Ignoring unreadable catalog cache entry"),
        }

        let items = self.repo.list_items().await.context("Failed to list catalog")?;
        if let Err(e) = self.cache.set(CATALOG_KEY, &items, self.cache.default_ttl()).await {
            tracing::warn!(error = %e, "Failed to cache catalog");
        }
        Ok(items)
    }

    pub async fn get_item(&self, id: i64) -> ServiceResult<GoBagItem> {
        self.repo
            .get_item(id)
            .await
            .context("Failed to get catalog item")?
            .ok_or_else(|| ServiceError::not_found("Item"))
    }

    pub async fn create_item(&self, input: GoBagItemInput) -> ServiceResult<GoBagItem> {
        let input = normalize(input)?;
        let item = self
            .repo
            .create_item(&input)
            .await
            .map_err(|e| ServiceError::from_insert(e, "An item with that name already exists"))?;
        self.invalidate_catalog().await;
        tracing::info!(item_id = item.id, name = %item.name, "Catalog item created");
        Ok(item)
    }

    pub async fn update_item(&self, id: i64, input: GoBagItemInput) -> ServiceResult<GoBagItem> {
        let input = normalize(input)?;
        let item = self
            .repo
            .update_item(id, &input)
            .await
            .map_err(|e| ServiceError::from_insert(e, "An item with that name already exists"))?
            .ok_or_else(|| ServiceError::not_found("Item"))?;
        self.invalidate_catalog().await;
        Ok(item)
    }

    /// Removing an item also unpacks it everywhere
    pub async fn delete_item(&self, id: i64) -> ServiceResult<()> {
        if !self.repo.delete_item(id).await.context("Failed to delete item")? {
            return Err(ServiceError::not_found("Item"));
        }
        self.invalidate_catalog().await;
        tracing::info!(item_id = id, "Catalog item deleted");
        Ok(())
    }

    pub async fn get_go_bag(&self, user_id: i64) -> ServiceResult<GoBag> {
        let catalog = self.list_items().await?;
        let packed = self
            .repo
            .packed_item_ids(user_id)
            .await
            .context("Failed to read packed items")?;
        Ok(GoBag::assemble(user_id, catalog, &packed))
    }

    /// Mark an item packed; packing twice changes nothing
    pub async fn pack(&self, user_id: i64, item_id: i64) -> ServiceResult<GoBag> {
        self.get_item(item_id).await?;
        self.repo
            .pack(user_id, item_id)
            .await
            .context("Failed to pack item")?;
        self.get_go_bag(user_id).await
    }

    pub async fn unpack(&self, user_id: i64, item_id: i64) -> ServiceResult<GoBag> {
        self.get_item(item_id).await?;
        self.repo
            .unpack(user_id, item_id)
            .await
            .context("Failed to unpack item")?;
        self.get_go_bag(user_id).await
    }

    /// Replace the packed set wholesale; every id must be in the catalog
    pub async fn set_packed(&self, user_id: i64, item_ids: &[i64]) -> ServiceResult<GoBag> {
        let ids: Vec<i64> = item_ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        let known = self
            .repo
            .get_items(&ids)
            .await
            .context("Failed to look up items")?;
        if known.len() != ids.len() {
            let missing: Vec<String> = ids
                .iter()
                .filter(|id| !known.iter().any(|item| item.id == **id))
                .map(|id| id.to_string())
                .collect();
            return Err(ServiceError::Validation(format!(
                "Unknown item ids: {}",
                missing.join(", ")
            )));
        }

        self.repo
            .set_packed(user_id, &ids)
            .await
            .context("Failed to save packed items")?;
        self.get_go_bag(user_id).await
    }

    async fn invalidate_catalog(&self) {
        if let Err(e) = self.cache.delete(CATALOG_KEY).await {
            tracing::warn!(error = %e, "Failed to invalidate catalog cache");
        }
    }
}

fn normalize(mut input: GoBagItemInput) -> ServiceResult<GoBagItemInput> {
    input.name = input.name.trim().to_string();
    input.description = input.description.trim().to_string();
    if input.name.is_empty() {
        return Err(ServiceError::validation("Item name cannot be empty"));
    }
    if input.name.chars().count() > MAX_ITEM_NAME_LENGTH {
        return Err(ServiceError::Validation(format!(
            "Item name must be at most {} characters",
            MAX_ITEM_NAME_LENGTH
        )));
    }
    Ok(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::repositories::SqlxGoBagRepository;
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::models::ItemCategory;

    async fn setup() -> (DynDatabasePool, GoBagService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.unwrap();
        sqlx::query(
            "INSERT INTO users (name, email, password_hash, province, city) VALUES ('a', 'a@x.ph', 'h', 'Leyte', 'Palo')",
        )
        .execute(pool.sqlite())
        .await
        .unwrap();
        let service = GoBagService::new(SqlxGoBagRepository::boxed(pool.clone()), Arc::new(MemoryCache::new()));
        (pool, service)
    }

    fn item(name: &str) -> GoBagItemInput {
        GoBagItemInput {
            name: name.to_string(),
            category: ItemCategory::Other,
            description: String::new(),
            is_essential: false,
        }
    }

    #[tokio::test]
    async fn test_empty_bag_lists_whole_catalog() {
        let (_pool, service) = setup().await;
        let bag = service.get_go_bag(1).await.unwrap();
        assert_eq!(bag.total_count, 14);
        assert_eq!(bag.packed_count, 0);
        assert_eq!(bag.completion, 0);
        assert!(bag.essential_missing.contains(&"First aid kit".to_string()));
    }

    #[tokio::test]
    async fn test_pack_is_idempotent_and_unknown_item_is_not_found() {
        let (_pool, service) = setup().await;
        service.pack(1, 3).await.unwrap();
        let bag = service.pack(1, 3).await.unwrap();
        assert_eq!(bag.packed_count, 1);
        assert!(!bag.essential_missing.contains(&"First aid kit".to_string()));

        assert!(matches!(service.pack(1, 999).await, Err(ServiceError::NotFound(_))));

        let bag = service.unpack(1, 3).await.unwrap();
        assert_eq!(bag.packed_count, 0);
    }

    #[tokio::test]
    async fn test_set_packed_replaces_set() {
        let (_pool, service) = setup().await;
        service.pack(1, 1).await.unwrap();

        let bag = service.set_packed(1, &[2, 3, 3, 4, 5, 6, 7]).await.unwrap();
        assert_eq!(bag.packed_count, 6);
        assert_eq!(bag.completion, 42);
        assert!(!bag.items.iter().any(|e| e.item.id == 1 && e.packed));

        let err = service.set_packed(1, &[1, 404]).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(msg) if msg.contains("404")));
        // failed replacement leaves the previous set alone
        assert_eq!(service.get_go_bag(1).await.unwrap().packed_count, 6);
    }

    #[tokio::test]
    async fn test_catalog_crud_invalidates_cache() {
        let (_pool, service) = setup().await;
        assert_eq!(service.list_items().await.unwrap().len(), 14);

        let created = service.create_item(item("  Rope ")).await.unwrap();
        assert_eq!(created.name, "Rope");
        assert_eq!(service.list_items().await.unwrap().len(), 15);

        let dup = service.create_item(item("Rope")).await.unwrap_err();
        assert!(matches!(dup, ServiceError::Conflict(_)));

        let renamed = service.update_item(created.id, item("Nylon rope")).await.unwrap();
        assert_eq!(renamed.name, "Nylon rope");
        assert!(service.list_items().await.unwrap().iter().any(|i| i.name == "Nylon rope"));

        service.delete_item(created.id).await.unwrap();
        assert_eq!(service.list_items().await.unwrap().len(), 14);
        assert!(matches!(service.delete_item(created.id).await, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_item_name_required() {
        let (_pool, service) = setup().await;
        assert!(matches!(service.create_item(item("   ")).await, Err(ServiceError::Validation(_))));
    }
}
