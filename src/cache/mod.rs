//! Cache layer
//!
//! In-process cache (moka) holding JSON-serialised values. Used for the item
//! catalog and leaderboard pages; anything that changes points invalidates
//! `leaderboard:*`.
//!
//! ```rust,ignore
//! use preppal::cache::{create_cache, CacheLayer};
//! use preppal::config::CacheConfig;
//!
//! let cache = create_cache(&CacheConfig::default());
//! cache.set("catalog", &items, cache.default_ttl()).await?;
//! ```

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;

pub use memory::MemoryCache;

/// Key prefix shared by every leaderboard page
pub const LEADERBOARD_PATTERN: &str = "leaderboard:*";

/// Key of the cached go bag catalog
pub const CATALOG_KEY: &str = "go_bag:catalog";

/// Cache layer trait
///
/// The methods are generic, so the trait is not object safe; services hold
/// a concrete `Arc<MemoryCache>`.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    /// Get a value from cache
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    /// Set a value in cache with TTL
    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>;

    /// Delete a value from cache
    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete all values whose key matches a glob pattern
    async fn delete_pattern(&self, pattern: &str) -> Result<()>;

    /// Clear all cache entries
    async fn clear(&self) -> Result<()>;
}

pub type SharedCache = Arc<MemoryCache>;

/// Create the cache described by `config`
pub fn create_cache(config: &CacheConfig) -> SharedCache {
    Arc::new(MemoryCache::with_capacity_and_ttl(
        config.capacity,
        Duration::from_secs(config.ttl_seconds),
    ))
}
