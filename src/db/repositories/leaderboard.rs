//! Leaderboard queries
//!
//! Only active citizens are ranked. Rank is competition style: one plus the
//! number of ranked users with strictly more points, so ties share a rank.

use crate::db::DynDatabasePool;
use crate::models::{LeaderboardEntry, ListParams, MyRank, User};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use std::sync::Arc;

/// Optional province/city narrowing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Region {
    pub province: Option<String>,
    pub city: Option<String>,
}

#[async_trait]
pub trait LeaderboardRepository: Send + Sync {
    /// Points desc, then earlier registration
    async fn top(&self, region: &Region, params: &ListParams) -> Result<(Vec<LeaderboardEntry>, i64)>;

    /// Overall and in-city rank of `user`
    async fn rank_of(&self, user: &User) -> Result<MyRank>;
}

pub struct SqlxLeaderboardRepository {
    pool: DynDatabasePool,
}

impl SqlxLeaderboardRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn LeaderboardRepository> {
        Arc::new(Self::new(pool))
    }
}

/// Ranked-user condition for a table alias
fn ranked(alias: &str) -> String {
    format!("{a}.role = 'citizen' AND {a}.status = 'active'", a = alias)
}

/// Province/city narrowing bound to `?1` and `?2`; NULL disables each part
fn in_region(alias: &str) -> String {
    format!(
        "(?1 IS NULL OR {a}.province = ?1 COLLATE NOCASE) AND (?2 IS NULL OR {a}.city = ?2 COLLATE NOCASE)",
        a = alias
    )
}

#[async_trait]
impl LeaderboardRepository for SqlxLeaderboardRepository {
    async fn top(&self, region: &Region, params: &ListParams) -> Result<(Vec<LeaderboardEntry>, i64)> {
        let sql = format!(
            r#"
            SELECT u.id, u.name, u.province, u.city, u.points, u.avatar_url,
                   1 + (SELECT COUNT(*) FROM users o
                        WHERE {ranked_o} AND {region_o} AND o.points > u.points) AS user_rank
            FROM users u
            WHERE {ranked_u} AND {region_u}
            ORDER BY u.points DESC, u.created_at ASC, u.id ASC
            LIMIT ?3 OFFSET ?4
            "#,
            ranked_o = ranked("o"),
            ranked_u = ranked("u"),
            region_o = in_region("o"),
            region_u = in_region("u"),
        );

        let rows = sqlx::query(&sql)
            .bind(&region.province)
            .bind(&region.city)
            .bind(params.limit())
            .bind(params.offset())
            .fetch_all(self.pool.sqlite())
            .await
            .context("Failed to load leaderboard")?;

        let entries = rows
            .iter()
            .map(|row| LeaderboardEntry {
                rank: row.get("user_rank"),
                user_id: row.get("id"),
                name: row.get("name"),
                province: row.get("province"),
                city: row.get("city"),
                points: row.get("points"),
                avatar_url: row.get("avatar_url"),
            })
            .collect();

        let count_sql = format!(
            "SELECT COUNT(*) as count FROM users u WHERE {} AND {}",
            ranked("u"),
            in_region("u")
        );
        let total: i64 = sqlx::query(&count_sql)
            .bind(&region.province)
            .bind(&region.city)
            .fetch_one(self.pool.sqlite())
            .await
            .context("Failed to count leaderboard")?
            .get("count");

        Ok((entries, total))
    }

    async fn rank_of(&self, user: &User) -> Result<MyRank> {
        let row = sqlx::query(&format!(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users u WHERE {r} AND u.points > ?1) AS above,
                (SELECT COUNT(*) FROM users u WHERE {r}) AS total,
                (SELECT COUNT(*) FROM users u WHERE {r} AND u.points > ?1
                    AND u.province = ?2 COLLATE NOCASE AND u.city = ?3 COLLATE NOCASE) AS city_above,
                (SELECT COUNT(*) FROM users u WHERE {r}
                    AND u.province = ?2 COLLATE NOCASE AND u.city = ?3 COLLATE NOCASE) AS city_total
            "#,
            r = ranked("u")
        ))
        .bind(user.points)
        .bind(&user.location.province)
        .bind(&user.location.city)
        .fetch_one(self.pool.sqlite())
        .await
        .context("Failed to compute rank")?;

        let above: i64 = row.get("above");
        let city_above: i64 = row.get("city_above");

        Ok(MyRank {
            user_id: user.id,
            points: user.points,
            overall_rank: above + 1,
            overall_total: row.get("total"),
            city_rank: city_above + 1,
            city_total: row.get("city_total"),
        })
    }
}
