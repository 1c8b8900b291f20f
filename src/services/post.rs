//! Post service
//!
//! Go bag posts and community verification. A post freezes a snapshot of
//! catalog items; other users then confirm which of those items they can
//! see in the photo, and items confirmed by a strict majority of raters earn
//! the owner points. The tally itself lives in `PostRepository::rate`.

use crate::cache::{CacheLayer, SharedCache, LEADERBOARD_PATTERN};
use crate::db::repositories::{GoBagRepository, NewPost, PostRepository, UserRepository};
use crate::models::{
    ListParams, PagedResult, Post, PostCard, PostDetail, PostFilter, Rating, RatingOutcome,
    SnapshotItemView, User,
};
use crate::services::error::{ServiceError, ServiceResult};
use crate::services::image_host::{delete_quietly, DynImageHost};
use anyhow::Context;
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;

const MAX_CAPTION_LENGTH: usize = 500;

/// An uploaded image, already checked against the upload limits
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub data: Vec<u8>,
    pub content_type: String,
}

/// Input for creating a post
#[derive(Debug, Clone, Default)]
pub struct CreatePostInput {
    pub caption: String,
    /// Snapshot items; `None` snapshots whatever the author has packed
    pub item_ids: Option<Vec<i64>>,
    pub image: Option<ImageUpload>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdatePostInput {
    pub caption: Option<String>,
    pub image: Option<ImageUpload>,
}

pub struct PostService {
    posts: Arc<dyn PostRepository>,
    go_bag: Arc<dyn GoBagRepository>,
    users: Arc<dyn UserRepository>,
    images: DynImageHost,
    cache: SharedCache,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostRepository>,
        go_bag: Arc<dyn GoBagRepository>,
        users: Arc<dyn UserRepository>,
        images: DynImageHost,
        cache: SharedCache,
    ) -> Self {
        Self {
            posts,
            go_bag,
            users,
            images,
            cache,
        }
    }

    pub async fn create_post(&self, author: &User, input: CreatePostInput) -> ServiceResult<PostDetail> {
        let caption = validate_caption(&input.caption)?;
        let image = input
            .image
            .ok_or_else(|| ServiceError::validation("An image of the go bag is required"))?;

        let snapshot = match input.item_ids {
            Some(ids) => {
                let ids: Vec<i64> = ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
                let items = self
                    .go_bag
                    .get_items(&ids)
                    .await
                    .context("Failed to look up snapshot items")?;
                if items.len() != ids.len() {
                    return Err(ServiceError::validation("Snapshot contains unknown items"));
                }
                items
            }
            None => {
                let packed = self
                    .go_bag
                    .packed_item_ids(author.id)
                    .await
                    .context("Failed to read packed items")?;
                self.go_bag
                    .get_items(&packed)
                    .await
                    .context("Failed to look up packed items")?
            }
        };
        if snapshot.is_empty() {
            return Err(ServiceError::validation(
                "A post needs at least one go bag item to verify",
            ));
        }

        let hosted = self
            .images
            .upload(&image.data, &image.content_type)
            .await
            .context("Failed to upload post image")?;

        let new_post = NewPost {
            user_id: author.id,
            image_url: hosted.url,
            image_public_id: hosted.public_id.clone(),
            caption,
        };
        let post = match self.posts.create(&new_post, &snapshot).await {
            Ok(post) => post,
            Err(e) => {
                delete_quietly(self.images.as_ref(), Some(&hosted.public_id)).await;
                return Err(e.context("Failed to create post").into());
            }
        };

        tracing::info!(post_id = post.id, user_id = author.id, items = snapshot.len(), "Post created");
        self.detail(post, Some(author.id)).await
    }

    pub async fn get_post(&self, id: i64, viewer: Option<&User>) -> ServiceResult<PostDetail> {
        let post = self.find(id).await?;
        self.detail(post, viewer.map(|v| v.id)).await
    }

    pub async fn list_posts(&self, filter: &PostFilter, params: ListParams) -> ServiceResult<PagedResult<PostCard>> {
        let (rows, total) = self
            .posts
            .list(filter, &params)
            .await
            .context("Failed to list posts")?;
        let cards = rows
            .into_iter()
            .map(|(post, author)| PostCard { post, author })
            .collect();
        Ok(PagedResult::new(cards, total, &params))
    }

    pub async fn list_user_posts(&self, user_id: i64, params: ListParams) -> ServiceResult<PagedResult<PostCard>> {
        let filter = PostFilter {
            user_id: Some(user_id),
            city: None,
        };
        self.list_posts(&filter, params).await
    }

    /// Owner only. A replaced image is removed from the host afterwards.
    pub async fn update_post(&self, user: &User, id: i64, input: UpdatePostInput) -> ServiceResult<PostDetail> {
        let mut post = self.find(id).await?;
        if post.user_id != user.id {
            return Err(ServiceError::forbidden("Only the author can edit this post"));
        }

        if let Some(caption) = input.caption {
            post.caption = validate_caption(&caption)?;
        }

        let mut stale_image = None;
        if let Some(image) = input.image {
            let hosted = self
                .images
                .upload(&image.data, &image.content_type)
                .await
                .context("Failed to upload post image")?;
            stale_image = Some(std::mem::replace(&mut post.image_public_id, hosted.public_id));
            post.image_url = hosted.url;
        }
        post.updated_at = Utc::now();

        let post = self.posts.update(&post).await.context("Failed to update post")?;
        delete_quietly(self.images.as_ref(), stale_image.as_deref()).await;

        self.detail(post, Some(user.id)).await
    }

    /// Author, an LGU of the author's city, or a super admin
    pub async fn delete_post(&self, user: &User, id: i64) -> ServiceResult<()> {
        let post = self.find(id).await?;
        if post.user_id != user.id {
            let owner = self
                .users
                .get_by_id(post.user_id)
                .await
                .context("Failed to get post owner")?;
            let allowed = owner
                .map(|owner| user.scope().covers(&owner.location))
                .unwrap_or(user.is_super_admin());
            if !allowed {
                return Err(ServiceError::forbidden("You cannot delete this post"));
            }
        }

        self.remove(&post).await?;
        tracing::info!(post_id = id, by = user.id, "Post deleted");
        Ok(())
    }

    /// Delete without permission checks; used by moderation
    pub(crate) async fn remove(&self, post: &Post) -> ServiceResult<()> {
        self.posts.delete(post.id).await.context("Failed to delete post")?;
        delete_quietly(self.images.as_ref(), Some(&post.image_public_id)).await;
        Ok(())
    }

    pub(crate) async fn find(&self, id: i64) -> ServiceResult<Post> {
        self.posts
            .get_by_id(id)
            .await
            .context("Failed to get post")?
            .ok_or_else(|| ServiceError::not_found("Post"))
    }

    /// Confirm which snapshot items are visible in the photo.
    ///
    /// An empty list is a valid vote for "none of them". Each user rates a
    /// post once, and never their own.
    pub async fn rate_post(&self, rater: &User, post_id: i64, confirmed_item_ids: &[i64]) -> ServiceResult<RatingOutcome> {
        let post = self.find(post_id).await?;
        if post.user_id == rater.id {
            return Err(ServiceError::validation("You cannot rate your own post"));
        }

        let snapshot = self
            .posts
            .get_items(post_id)
            .await
            .context("Failed to read snapshot")?;
        let confirmed: Vec<i64> = confirmed_item_ids
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if let Some(stray) = confirmed
            .iter()
            .find(|id| !snapshot.iter().any(|item| item.item_id == **id))
        {
            return Err(ServiceError::Validation(format!(
                "Item {} is not part of this post",
                stray
            )));
        }

        let outcome = self
            .posts
            .rate(post_id, rater.id, &confirmed)
            .await
            .map_err(|e| ServiceError::from_insert(e, "You have already rated this post"))?;

        tracing::info!(
            post_id,
            rater_id = rater.id,
            verified = outcome.verified_item_count,
            points = outcome.points_awarded,
            "Post rated"
        );
        if outcome.points_awarded > 0 {
            if let Err(e) = self.cache.delete_pattern(LEADERBOARD_PATTERN).await {
                tracing::warn!(error = %e, "Failed to invalidate leaderboard cache");
            }
        }
        Ok(outcome)
    }

    pub async fn list_ratings(&self, post_id: i64) -> ServiceResult<Vec<Rating>> {
        self.find(post_id).await?;
        let ratings = self
            .posts
            .list_ratings(post_id)
            .await
            .context("Failed to list ratings")?;
        Ok(ratings)
    }

    async fn detail(&self, post: Post, viewer_id: Option<i64>) -> ServiceResult<PostDetail> {
        let author = self
            .posts
            .get_author(post.user_id)
            .await
            .context("Failed to get post author")?
            .ok_or_else(|| ServiceError::not_found("Post author"))?;
        let items = self
            .posts
            .get_items(post.id)
            .await
            .context("Failed to read snapshot")?
            .into_iter()
            .map(|item| SnapshotItemView::from_item(item, post.rater_count))
            .collect();
        let viewer_has_rated = match viewer_id {
            Some(id) => self
                .posts
                .has_rated(post.id, id)
                .await
                .context("Failed to check rating")?,
            None => false,
        };

        Ok(PostDetail {
            post,
            author,
            items,
            viewer_has_rated,
        })
    }
}

fn validate_caption(caption: &str) -> ServiceResult<String> {
    let caption = caption.trim();
    if caption.chars().count() > MAX_CAPTION_LENGTH {
        return Err(ServiceError::Validation(format!(
            "Caption must be at most {} characters",
            MAX_CAPTION_LENGTH
        )));
    }
    Ok(caption.to_string())
}
