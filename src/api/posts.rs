//! Post and rating API endpoints
//!
//! - GET /api/v1/posts - Feed, newest first (`city`, `user_id`, paging)
//! - GET /api/v1/posts/{id} - One post with its snapshot
//! - POST /api/v1/posts - Create (multipart: `image`, `caption`, `item_ids`)
//! - PUT /api/v1/posts/{id} - Edit caption and/or image (multipart)
//! - DELETE /api/v1/posts/{id} - Delete
//! - GET /api/v1/posts/{id}/ratings - Ratings of a post
//! - POST /api/v1/posts/{id}/ratings - Rate a post

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{default_page, default_per_page, non_empty};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};
use crate::api::upload::{parse_item_ids, read_form};
use crate::models::{ListParams, PagedResult, PostCard, PostDetail, PostFilter, Rating, RatingOutcome};
use crate::services::{CreatePostInput, UpdatePostInput};

#[derive(Debug, Deserialize)]
pub struct PostListQuery {
    pub city: Option<String>,
    pub user_id: Option<i64>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

#[derive(Debug, Deserialize)]
pub struct RateRequest {
    #[serde(default)]
    pub confirmed_item_ids: Vec<i64>,
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_posts))
        .route("/{id}", get(get_post))
        .route("/{id}/ratings", get(list_ratings))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_post))
        .route("/{id}", put(update_post).delete(delete_post))
        .route("/{id}/ratings", post(rate_post))
}

async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PostListQuery>,
) -> Result<Json<PagedResult<PostCard>>, ApiError> {
    let filter = PostFilter {
        user_id: query.user_id,
        city: non_empty(query.city),
    };
    let posts = state
        .post_service
        .list_posts(&filter, ListParams::new(query.page, query.per_page))
        .await?;
    Ok(Json(posts))
}

async fn get_post(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<i64>,
) -> Result<Json<PostDetail>, ApiError> {
    Ok(Json(state.post_service.get_post(id, viewer.as_ref()).await?))
}

async fn create_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<PostDetail>), ApiError> {
    let form = read_form(&mut multipart, "image", &state.upload_config).await?;
    let item_ids = match form.text("item_ids") {
        Some(raw) => Some(parse_item_ids(raw)?),
        None => None,
    };
    let input = CreatePostInput {
        caption: form.text("caption").unwrap_or_default().to_string(),
        item_ids,
        image: form.image,
    };
    let post = state.post_service.create_post(&user.0, input).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

async fn update_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Result<Json<PostDetail>, ApiError> {
    let form = read_form(&mut multipart, "image", &state.upload_config).await?;
    let input = UpdatePostInput {
        caption: form.text("caption").map(str::to_string),
        image: form.image,
    };
    Ok(Json(state.post_service.update_post(&user.0, id, input).await?))
}

async fn delete_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.post_service.delete_post(&user.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_ratings(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Rating>>, ApiError> {
    Ok(Json(state.post_service.list_ratings(id).await?))
}

async fn rate_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<RateRequest>,
) -> Result<(StatusCode, Json<RatingOutcome>), ApiError> {
    let outcome = state
        .post_service
        .rate_post(&user.0, id, &body.confirmed_item_ids)
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}
