//! Public user pages
//!
//! - GET /api/v1/users/{id} - Public profile
//! - GET /api/v1/users/{id}/posts - Posts by that user

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};

use crate::api::common::PaginationQuery;
use crate::api::middleware::{ApiError, AppState};
use crate::models::{PagedResult, PostCard, PublicProfile};

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(get_profile))
        .route("/{id}/posts", get(list_user_posts))
}

async fn get_profile(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PublicProfile>, ApiError> {
    Ok(Json(state.user_service.public_profile(id).await?))
}

async fn list_user_posts(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PagedResult<PostCard>>, ApiError> {
    state.user_service.get_user(id).await?;
    let posts = state
        .post_service
        .list_user_posts(id, (&query).into())
        .await?;
    Ok(Json(posts))
}
