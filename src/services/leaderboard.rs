//! Leaderboard service
//!
//! Pages are cached under `leaderboard:{scope}:{province}:{city}:{page}:{per_page}`
//! and dropped wholesale whenever points, roles or bans change.

use crate::cache::{CacheLayer, SharedCache};
use crate::db::repositories::{LeaderboardRepository, Region};
use crate::models::{LeaderboardEntry, LeaderboardScope, ListParams, MyRank, PagedResult, User};
use crate::services::error::{ServiceError, ServiceResult};
use anyhow::Context;
use std::sync::Arc;

pub struct LeaderboardService {
    repo: Arc<dyn LeaderboardRepository>,
    cache: SharedCache,
}

impl LeaderboardService {
    pub fn new(repo: Arc<dyn LeaderboardRepository>, cache: SharedCache) -> Self {
        Self { repo, cache }
    }

    /// Ranked citizens in a scope.
    ///
    /// A province or city scope without an explicit place falls back to the
    /// viewer's own location.
    pub async fn leaderboard(
        &self,
        scope: LeaderboardScope,
        province: Option<String>,
        city: Option<String>,
        viewer: Option<&User>,
        params: ListParams,
    ) -> ServiceResult<PagedResult<LeaderboardEntry>> {
        let region = resolve_region(scope, province, city, viewer)?;
        let key = cache_key(scope, &region, &params);

        match self.cache.get::<PagedResult<LeaderboardEntry>>(&key).await {
            Ok(Some(page)) => return Ok(page),
            Ok(None) => {}
            Err(e) => tracing::warn!(key = %key, error = %e, "Ignoring unreadable leaderboard cache entry"),
        }

        let (entries, total) = self
            .repo
            .top(&region, &params)
            .await
            .context("Failed to load leaderboard")?;
        let page = PagedResult::new(entries, total, &params);
        if let Err(e) = self.cache.set(&key, &page, self.cache.default_ttl()).await {
            tracing::warn!(key = %key, error = %e, "Failed to cache leaderboard page");
        }
        Ok(page)
    }

    /// The caller's standing overall and within their city; never cached
    pub async fn my_rank(&self, user: &User) -> ServiceResult<MyRank> {
        let rank = self.repo.rank_of(user).await.context("Failed to compute rank")?;
        Ok(rank)
    }
}

fn resolve_region(
    scope: LeaderboardScope,
    province: Option<String>,
    city: Option<String>,
    viewer: Option<&User>,
) -> ServiceResult<Region> {
    let clean = |value: Option<String>| value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    let province = clean(province).or_else(|| viewer.map(|u| u.location.province.clone()));
    let city = clean(city).or_else(|| viewer.map(|u| u.location.city.clone()));

    match scope {
        LeaderboardScope::Global => Ok(Region::default()),
        LeaderboardScope::Province => match province {
            Some(province) => Ok(Region {
                province: Some(province),
                city: None,
            }),
            None => Err(ServiceError::validation("province is required for this scope")),
        },
        LeaderboardScope::City => match (province, city) {
            (Some(province), Some(city)) => Ok(Region {
                province: Some(province),
                city: Some(city),
            }),
            _ => Err(ServiceError::validation("province and city are required for this scope")),
        },
    }
}

fn cache_key(scope: LeaderboardScope, region: &Region, params: &ListParams) -> String {
    let scope = match scope {
        LeaderboardScope::Global => "global",
        LeaderboardScope::Province => "province",
        LeaderboardScope::City => "city",
    };
    format!(
        "leaderboard:{}:{}:{}:{}:{}",
        scope,
        region.province.as_deref().unwrap_or("").to_lowercase(),
        region.city.as_deref().unwrap_or("").to_lowercase(),
        params.page,
        params.per_page
    )
}
