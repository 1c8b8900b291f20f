//! Dashboard aggregates
//!
//! Every query takes an optional `(province, city)` pair bound to `?1`/`?2`;
//! `None` aggregates over the whole population.

use crate::db::DynDatabasePool;
use crate::models::{completion_percent, round1, CityBreakdown, ItemPackRate, ReadinessBuckets, ReadinessOverview};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// Count of users by role and status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserCounts {
    pub total: i64,
    pub lgu: i64,
    pub banned: i64,
}

#[async_trait]
pub trait AnalyticsRepository: Send + Sync {
    async fn overview(&self, city: Option<(&str, &str)>) -> Result<ReadinessOverview>;

    /// One row per city with at least one active citizen
    async fn city_breakdown(&self) -> Result<Vec<CityBreakdown>>;

    async fn user_counts(&self) -> Result<UserCounts>;
}

pub struct SqlxAnalyticsRepository {
    pool: DynDatabasePool,
}

impl SqlxAnalyticsRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AnalyticsRepository> {
        Arc::new(Self::new(pool))
    }
}

const CITIZEN_IN_SCOPE: &str = "u.role = 'citizen' AND u.status = 'active' \
     AND (?1 IS NULL OR (u.province = ?1 COLLATE NOCASE AND u.city = ?2 COLLATE NOCASE))";

#[async_trait]
impl AnalyticsRepository for SqlxAnalyticsRepository {
    async fn overview(&self, city: Option<(&str, &str)>) -> Result<ReadinessOverview> {
        let pool = self.pool.sqlite();
        let province = city.map(|(p, _)| p);
        let city_name = city.map(|(_, c)| c);

        let catalog_size = scalar(pool, "SELECT COUNT(*) FROM go_bag_items", None, None).await?;

        let rows = sqlx::query(&format!(
            "SELECT (SELECT COUNT(*) FROM go_bag_entries e WHERE e.user_id = u.id) AS packed
             FROM users u WHERE {}",
            CITIZEN_IN_SCOPE
        ))
        .bind(province)
        .bind(city_name)
        .fetch_all(pool)
        .await
        .context("Failed to read go bag progress")?;

        let mut readiness = ReadinessBuckets::default();
        let mut completion_sum = 0i64;
        for row in &rows {
            let packed: i64 = row.get("packed");
            let completion = completion_percent(packed.max(0) as usize, catalog_size.max(0) as usize);
            completion_sum += completion as i64;
            readiness.add(completion);
        }
        let citizen_count = rows.len() as i64;
        let average_completion = if citizen_count > 0 {
            round1(completion_sum as f64 / citizen_count as f64)
        } else {
            0.0
        };

        let least_packed_items = sqlx::query(&format!(
            "SELECT i.id, i.name,
                    (SELECT COUNT(*) FROM go_bag_entries e JOIN users u ON u.id = e.user_id
                     WHERE e.item_id = i.id AND {}) AS packed_by
             FROM go_bag_items i
             ORDER BY packed_by ASC, i.name ASC
             LIMIT 5",
            CITIZEN_IN_SCOPE
        ))
        .bind(province)
        .bind(city_name)
        .fetch_all(pool)
        .await
        .context("Failed to rank catalog items")?
        .iter()
        .map(|row| ItemPackRate {
            item_id: row.get("id"),
            name: row.get("name"),
            packed_by: row.get("packed_by"),
        })
        .collect();

        let module_completions = scalar(
            pool,
            &format!(
                "SELECT COUNT(*) FROM module_completions m JOIN users u ON u.id = m.user_id WHERE {}",
                CITIZEN_IN_SCOPE
            ),
            province,
            city_name,
        )
        .await?;

        let quiz_row = sqlx::query(&format!(
            "SELECT COUNT(*) AS attempts,
                    COALESCE(AVG(CASE WHEN a.total > 0 THEN a.score * 100.0 / a.total END), 0.0) AS avg_score
             FROM quiz_attempts a JOIN users u ON u.id = a.user_id WHERE {}",
            CITIZEN_IN_SCOPE
        ))
        .bind(province)
        .bind(city_name)
        .fetch_one(pool)
        .await
        .context("Failed to aggregate quiz attempts")?;

        let post_count = scalar(
            pool,
            &format!(
                "SELECT COUNT(*) FROM posts p JOIN users u ON u.id = p.user_id WHERE {}",
                CITIZEN_IN_SCOPE
            ),
            province,
            city_name,
        )
        .await?;

        let mut pending_reports = scalar(
            pool,
            "SELECT COUNT(*) FROM content_reports
             WHERE status = 'PENDING'
               AND (?1 IS NULL OR (province = ?1 COLLATE NOCASE AND city = ?2 COLLATE NOCASE))",
            province,
            city_name,
        )
        .await?;
        if city.is_none() {
            pending_reports += scalar(
                pool,
                "SELECT COUNT(*) FROM question_reports WHERE status = 'PENDING'",
                None,
                None,
            )
            .await?;
        }

        let avg_score: f64 = quiz_row.get("avg_score");

        Ok(ReadinessOverview {
            citizen_count,
            average_completion,
            readiness,
            least_packed_items,
            module_completions,
            quiz_attempts: quiz_row.get("attempts"),
            average_quiz_score: round1(avg_score),
            post_count,
            pending_reports,
        })
    }

    async fn city_breakdown(&self) -> Result<Vec<CityBreakdown>> {
        let pool = self.pool.sqlite();
        let catalog_size = scalar(pool, "SELECT COUNT(*) FROM go_bag_items", None, None).await?;

        let rows = sqlx::query(
            r#"
            SELECT u.province, u.city, COUNT(*) AS citizens,
                   COALESCE(SUM(u.points), 0) AS total_points,
                   COALESCE(AVG((SELECT COUNT(*) FROM go_bag_entries e WHERE e.user_id = u.id) * 100 / ?), 0.0)
                       AS average_completion
            FROM users u
            WHERE u.role = 'citizen' AND u.status = 'active'
            GROUP BY u.province, u.city
            ORDER BY citizens DESC, u.province, u.city
            "#,
        )
        // NULL divisor turns an empty catalog into 0% instead of an error
        .bind(if catalog_size > 0 { Some(catalog_size) } else { None })
        .fetch_all(pool)
        .await
        .context("Failed to build city breakdown")?;

        Ok(rows
            .iter()
            .map(|row| {
                let average: f64 = row.get("average_completion");
                CityBreakdown {
                    province: row.get("province"),
                    city: row.get("city"),
                    citizens: row.get("citizens"),
                    average_completion: round1(average),
                    total_points: row.get("total_points"),
                }
            })
            .collect())
    }

    async fn user_counts(&self) -> Result<UserCounts> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total,
                    COALESCE(SUM(CASE WHEN role = 'lgu' THEN 1 ELSE 0 END), 0) AS lgu,
                    COALESCE(SUM(CASE WHEN status = 'banned' THEN 1 ELSE 0 END), 0) AS banned
             FROM users",
        )
        .fetch_one(self.pool.sqlite())
        .await
        .context("Failed to count users")?;

        Ok(UserCounts {
            total: row.get("total"),
            lgu: row.get("lgu"),
            banned: row.get("banned"),
        })
    }
}

async fn scalar(pool: &SqlitePool, sql: &str, province: Option<&str>, city: Option<&str>) -> Result<i64> {
    let mut query = sqlx::query(sql);
    if sql.contains("?1") {
        query = query.bind(province).bind(city);
    }
    let row = query
        .fetch_one(pool)
        .await
        .with_context(|| format!("Failed to run aggregate: {}", sql.lines().next().unwrap_or(sql)))?;
    Ok(row.get(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup() -> (DynDatabasePool, SqlxAnalyticsRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.unwrap();
        let db = pool.sqlite();

        // Seeded catalog has 14 items
        sqlx::query(
            "INSERT INTO users (name, email, password_hash, role, province, city, points) VALUES
                ('a', 'a@x.ph', 'h', 'citizen', 'Leyte', 'Tacloban', 40),
                ('b', 'b@x.ph', 'h', 'citizen', 'Leyte', 'Tacloban', 10),
                ('c', 'c@x.ph', 'h', 'citizen', 'Leyte', 'Ormoc', 5),
                ('m', 'm@x.ph', 'h', 'lgu', 'Leyte', 'Tacloban', 0)",
        )
        .execute(db)
        .await
        .unwrap();

        // a packs everything, b packs half, c nothing
        for item in 1..=14 {
            sqlx::query("INSERT INTO go_bag_entries (user_id, item_id) VALUES (1, ?)")
                .bind(item)
                .execute(db)
                .await
                .unwrap();
        }
        for item in 1..=7 {
            sqlx::query("INSERT INTO go_bag_entries (user_id, item_id) VALUES (2, ?)")
                .bind(item)
                .execute(db)
                .await
                .unwrap();
        }

        sqlx::query(
            "INSERT INTO content_reports (reporter_id, target_type, target_id, reason, province, city)
             VALUES (1, 'post', 1, 'spam', 'Leyte', 'Tacloban'),
                    (3, 'post', 2, 'spam', 'Leyte', 'Ormoc'),
                    (2, 'post', 3, 'spam', 'Samar', 'Tacloban')",
        )
        .execute(db)
        .await
        .unwrap();
        sqlx::query("INSERT INTO quizzes (title) VALUES ('q')")
            .execute(db)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO quiz_attempts (quiz_id, user_id, answers, score, total)
             VALUES (1, 1, '[]', 4, 4), (1, 2, '[]', 2, 4)",
        )
        .execute(db)
        .await
        .unwrap();

        (pool.clone(), SqlxAnalyticsRepository::new(pool))
    }

    #[tokio::test]
    async fn test_city_overview() {
        let (_pool, repo) = setup().await;
        let overview = repo.overview(Some(("Leyte", "tacloban"))).await.unwrap();

        assert_eq!(overview.citizen_count, 2);
        assert_eq!(overview.average_completion, 75.0);
        assert_eq!(overview.readiness.ready, 1);
        assert_eq!(overview.readiness.good, 1);
        assert_eq!(overview.quiz_attempts, 2);
        assert_eq!(overview.average_quiz_score, 75.0);
        // a same-named city in another province is not counted
        assert_eq!(overview.pending_reports, 1);
        assert_eq!(overview.least_packed_items.len(), 5);
        assert_eq!(overview.least_packed_items[0].packed_by, 1);
    }

    #[tokio::test]
    async fn test_global_overview_and_breakdown() {
        let (_pool, repo) = setup().await;
        let overview = repo.overview(None).await.unwrap();
        assert_eq!(overview.citizen_count, 3);
        assert_eq!(overview.readiness.low, 1);
        assert_eq!(overview.pending_reports, 3);

        let cities = repo.city_breakdown().await.unwrap();
        assert_eq!(cities.len(), 2);
        assert_eq!(cities[0].city, "Tacloban");
        assert_eq!(cities[0].citizens, 2);
        assert_eq!(cities[0].total_points, 50);
        assert_eq!(cities[0].average_completion, 75.0);
        assert_eq!(cities[1].average_completion, 0.0);
    }

    #[tokio::test]
    async fn test_user_counts() {
        let (_pool, repo) = setup().await;
        let counts = repo.user_counts().await.unwrap();
        assert_eq!(counts, UserCounts { total: 4, lgu: 1, banned: 0 });
    }
}
