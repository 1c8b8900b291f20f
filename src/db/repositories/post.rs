//! Post repository
//!
//! Posts, their item snapshots, and community ratings. Rating a post is a
//! read-modify-write over the snapshot tallies, so `rate` runs it inside a
//! single transaction that starts with the rating insert.

use crate::db::DynDatabasePool;
use crate::models::{
    count_verified, points_for_verification, GoBagItem, ListParams, Post, PostAuthor,
    PostFilter, Rating, RatingOutcome, SnapshotItem,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// Data needed to insert a post
#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: i64,
    pub image_url: String,
    pub image_public_id: String,
    pub caption: String,
}

#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Insert a post together with its snapshot
    async fn create(&self, post: &NewPost, snapshot: &[GoBagItem]) -> Result<Post>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>>;

    /// Snapshot items of a post, in item id order
    async fn get_items(&self, post_id: i64) -> Result<Vec<SnapshotItem>>;

    /// Author details for a post owner
    async fn get_author(&self, user_id: i64) -> Result<Option<PostAuthor>>;

    /// Newest first, with author
    async fn list(&self, filter: &PostFilter, params: &ListParams) -> Result<(Vec<(Post, PostAuthor)>, i64)>;

    /// Replace caption and image
    async fn update(&self, post: &Post) -> Result<Post>;

    /// Returns false when the post did not exist
    async fn delete(&self, id: i64) -> Result<bool>;

    async fn count_by_user(&self, user_id: i64) -> Result<i64>;

    /// Record a rating and settle verification points.
    ///
    /// `confirmed` must already be deduplicated and contained in the snapshot.
    /// A second rating by the same user fails with a unique violation.
    async fn rate(&self, post_id: i64, rater_id: i64, confirmed: &[i64]) -> Result<RatingOutcome>;

    async fn list_ratings(&self, post_id: i64) -> Result<Vec<Rating>>;

    async fn has_rated(&self, post_id: i64, user_id: i64) -> Result<bool>;
}

pub struct SqlxPostRepository {
    pool: DynDatabasePool,
}

impl SqlxPostRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, post: &NewPost, snapshot: &[GoBagItem]) -> Result<Post> {
        create_post(self.pool.sqlite(), post, snapshot).await
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>> {
        get_post_by_id(self.pool.sqlite(), id).await
    }

    async fn get_items(&self, post_id: i64) -> Result<Vec<SnapshotItem>> {
        let rows = sqlx::query(
            "SELECT item_id, item_name, vote_count FROM post_items WHERE post_id = ? ORDER BY item_id",
        )
        .bind(post_id)
        .fetch_all(self.pool.sqlite())
        .await
        .context("Failed to get post items")?;

        Ok(rows
            .iter()
            .map(|row| SnapshotItem {
                item_id: row.get("item_id"),
                item_name: row.get("item_name"),
                vote_count: row.get("vote_count"),
            })
            .collect())
    }

    async fn get_author(&self, user_id: i64) -> Result<Option<PostAuthor>> {
        let row = sqlx::query("SELECT id, name, city, avatar_url FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(self.pool.sqlite())
            .await
            .context("Failed to get post author")?;

        Ok(row.map(|row| PostAuthor {
            id: row.get("id"),
            name: row.get("name"),
            city: row.get("city"),
            avatar_url: row.get("avatar_url"),
        }))
    }

    async fn list(&self, filter: &PostFilter, params: &ListParams) -> Result<(Vec<(Post, PostAuthor)>, i64)> {
        list_posts(self.pool.sqlite(), filter, params).await
    }

    async fn update(&self, post: &Post) -> Result<Post> {
        sqlx::query("UPDATE posts SET caption = ?, image_url = ?, image_public_id = ?, updated_at = ? WHERE id = ?")
            .bind(&post.caption)
            .bind(&post.image_url)
            .bind(&post.image_public_id)
            .bind(Utc::now())
            .bind(post.id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to update post")?;

        get_post_by_id(self.pool.sqlite(), post.id)
            .await?
            .context("Post not found after update")
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to delete post")?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_by_user(&self, user_id: i64) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM posts WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(self.pool.sqlite())
            .await
            .context("Failed to count posts")?;
        Ok(row.get("count"))
    }

    async fn rate(&self, post_id: i64, rater_id: i64, confirmed: &[i64]) -> Result<RatingOutcome> {
        rate_post(self.pool.sqlite(), post_id, rater_id, confirmed).await
    }

    async fn list_ratings(&self, post_id: i64) -> Result<Vec<Rating>> {
        let rows = sqlx::query(
            "SELECT id, post_id, user_id, confirmed_item_ids, points_awarded, created_at
             FROM ratings WHERE post_id = ? ORDER BY created_at, id",
        )
        .bind(post_id)
        .fetch_all(self.pool.sqlite())
        .await
        .context("Failed to list ratings")?;

        rows.iter().map(row_to_rating).collect()
    }

    async fn has_rated(&self, post_id: i64, user_id: i64) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM ratings WHERE post_id = ? AND user_id = ?")
            .bind(post_id)
            .bind(user_id)
            .fetch_one(self.pool.sqlite())
            .await
            .context("Failed to check rating")?;
        let count: i64 = row.get("count");
        Ok(count > 0)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

const POST_COLUMNS: &str = "p.id, p.user_id, p.image_url, p.image_public_id, p.caption, p.rater_count, \
     p.verified_item_count, p.awarded_item_count, p.created_at, p.updated_at";

async fn create_post(pool: &SqlitePool, post: &NewPost, snapshot: &[GoBagItem]) -> Result<Post> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        INSERT INTO posts (user_id, image_url, image_public_id, caption, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(post.user_id)
    .bind(&post.image_url)
    .bind(&post.image_public_id)
    .bind(&post.caption)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("Failed to create post")?;
    let id = result.last_insert_rowid();

    for item in snapshot {
        sqlx::query("INSERT OR IGNORE INTO post_items (post_id, item_id, item_name) VALUES (?, ?, ?)")
            .bind(id)
            .bind(item.id)
            .bind(&item.name)
            .execute(&mut *tx)
            .await
            .context("Failed to store post snapshot")?;
    }

    tx.commit().await.context("Failed to commit post")?;

    Ok(Post {
        id,
        user_id: post.user_id,
        image_url: post.image_url.clone(),
        image_public_id: post.image_public_id.clone(),
        caption: post.caption.clone(),
        rater_count: 0,
        verified_item_count: 0,
        awarded_item_count: 0,
        created_at: now,
        updated_at: now,
    })
}

async fn get_post_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Post>> {
    let sql = format!("SELECT {} FROM posts p WHERE p.id = ?", POST_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get post by ID")?;

    Ok(row.as_ref().map(row_to_post))
}

async fn list_posts(
    pool: &SqlitePool,
    filter: &PostFilter,
    params: &ListParams,
) -> Result<(Vec<(Post, PostAuthor)>, i64)> {
    let city = filter.city.as_deref().map(str::trim).filter(|c| !c.is_empty());
    let conditions = "(?1 IS NULL OR p.user_id = ?1) AND (?2 IS NULL OR u.city = ?2 COLLATE NOCASE)";

    let sql = format!(
        "SELECT {}, u.name AS author_name, u.city AS author_city, u.avatar_url AS author_avatar
         FROM posts p JOIN users u ON u.id = p.user_id
         WHERE {}
         ORDER BY p.created_at DESC, p.id DESC
         LIMIT ?3 OFFSET ?4",
        POST_COLUMNS, conditions
    );
    let rows = sqlx::query(&sql)
        .bind(filter.user_id)
        .bind(city)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list posts")?;

    let posts = rows
        .iter()
        .map(|row| {
            let post = row_to_post(row);
            let author = PostAuthor {
                id: post.user_id,
                name: row.get("author_name"),
                city: row.get("author_city"),
                avatar_url: row.get("author_avatar"),
            };
            (post, author)
        })
        .collect();

    let count_sql = format!(
        "SELECT COUNT(*) as count FROM posts p JOIN users u ON u.id = p.user_id WHERE {}",
        conditions
    );
    let total: i64 = sqlx::query(&count_sql)
        .bind(filter.user_id)
        .bind(city)
        .fetch_one(pool)
        .await
        .context("Failed to count posts")?
        .get("count");

    Ok((posts, total))
}

async fn rate_post(
    pool: &SqlitePool,
    post_id: i64,
    rater_id: i64,
    confirmed: &[i64],
) -> Result<RatingOutcome> {
    let now = Utc::now();
    let confirmed_json = serde_json::to_string(confirmed)?;
    let mut tx = pool.begin().await?;

    // Writing first takes the database write lock before anything is read.
    let result = sqlx::query(
        "INSERT INTO ratings (post_id, user_id, confirmed_item_ids, points_awarded, created_at)
         VALUES (?, ?, ?, 0, ?)",
    )
    .bind(post_id)
    .bind(rater_id)
    .bind(&confirmed_json)
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("Failed to insert rating")?;
    let rating_id = result.last_insert_rowid();

    sqlx::query("UPDATE posts SET rater_count = rater_count + 1 WHERE id = ?")
        .bind(post_id)
        .execute(&mut *tx)
        .await
        .context("Failed to count rater")?;

    for item_id in confirmed {
        sqlx::query("UPDATE post_items SET vote_count = vote_count + 1 WHERE post_id = ? AND item_id = ?")
            .bind(post_id)
            .bind(item_id)
            .execute(&mut *tx)
            .await
            .context("Failed to record item vote")?;
    }

    let post = sqlx::query("SELECT user_id, rater_count, awarded_item_count FROM posts WHERE id = ?")
        .bind(post_id)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to reload post")?;
    let owner_id: i64 = post.get("user_id");
    let rater_count: i64 = post.get("rater_count");
    let awarded: i64 = post.get("awarded_item_count");

    let votes: Vec<i64> = sqlx::query("SELECT vote_count FROM post_items WHERE post_id = ?")
        .bind(post_id)
        .fetch_all(&mut *tx)
        .await
        .context("Failed to read item votes")?
        .iter()
        .map(|row| row.get("vote_count"))
        .collect();

    let verified = count_verified(&votes, rater_count);
    let points = points_for_verification(verified, awarded);

    if points > 0 {
        sqlx::query("UPDATE users SET points = points + ?, updated_at = ? WHERE id = ?")
            .bind(points)
            .bind(now)
            .bind(owner_id)
            .execute(&mut *tx)
            .await
            .context("Failed to award verification points")?;

        sqlx::query("UPDATE ratings SET points_awarded = ? WHERE id = ?")
            .bind(points)
            .bind(rating_id)
            .execute(&mut *tx)
            .await
            .context("Failed to store awarded points")?;
    }

    sqlx::query(
        "UPDATE posts SET verified_item_count = ?, awarded_item_count = ?, updated_at = ? WHERE id = ?",
    )
    .bind(verified)
    .bind(awarded.max(verified))
    .bind(now)
    .bind(post_id)
    .execute(&mut *tx)
    .await
    .context("Failed to store verification result")?;

    tx.commit().await.context("Failed to commit rating")?;

    Ok(RatingOutcome {
        rating: Rating {
            id: rating_id,
            post_id,
            user_id: rater_id,
            confirmed_item_ids: confirmed.to_vec(),
            points_awarded: points,
            created_at: now,
        },
        rater_count,
        verified_item_count: verified,
        points_awarded: points,
    })
}

fn row_to_post(row: &sqlx::sqlite::SqliteRow) -> Post {
    Post {
        id: row.get("id"),
        user_id: row.get("user_id"),
        image_url: row.get("image_url"),
        image_public_id: row.get("image_public_id"),
        caption: row.get("caption"),
        rater_count: row.get("rater_count"),
        verified_item_count: row.get("verified_item_count"),
        awarded_item_count: row.get("awarded_item_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_rating(row: &sqlx::sqlite::SqliteRow) -> Result<Rating> {
    let confirmed: String = row.get("confirmed_item_ids");
    Ok(Rating {
        id: row.get("id"),
        post_id: row.get("post_id"),
        user_id: row.get("user_id"),
        confirmed_item_ids: serde_json::from_str(&confirmed)
            .context("Malformed confirmed_item_ids")?,
        points_awarded: row.get("points_awarded"),
        created_at: row.get("created_at"),
    })
}
