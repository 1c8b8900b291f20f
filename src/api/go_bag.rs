//! Go bag API endpoints
//!
//! - GET /api/v1/go-bag/items - Item catalog
//! - GET /api/v1/go-bag/me - The caller's go bag with progress
//! - PUT /api/v1/go-bag/me - Replace the packed set
//! - POST /api/v1/go-bag/me/items/{item_id} - Pack one item
//! - DELETE /api/v1/go-bag/me/items/{item_id} - Unpack one item
//!
//! Catalog management lives under /admin/go-bag/items.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{GoBag, GoBagItem, GoBagItemInput};

#[derive(Debug, Deserialize)]
pub struct SetPackedRequest {
    pub item_ids: Vec<i64>,
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/items", get(list_items))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_my_go_bag).put(set_packed))
        .route("/me/items/{item_id}", post(pack_item).delete(unpack_item))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/items", post(create_item))
        .route("/items/{id}", put(update_item).delete(delete_item))
}

async fn list_items(State(state): State<AppState>) -> Result<Json<Vec<GoBagItem>>, ApiError> {
    Ok(Json(state.go_bag_service.list_items().await?))
}

async fn get_my_go_bag(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<GoBag>, ApiError> {
    Ok(Json(state.go_bag_service.get_go_bag(user.0.id).await?))
}

async fn set_packed(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<SetPackedRequest>,
) -> Result<Json<GoBag>, ApiError> {
    Ok(Json(
        state
            .go_bag_service
            .set_packed(user.0.id, &body.item_ids)
            .await?,
    ))
}

async fn pack_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(item_id): Path<i64>,
) -> Result<Json<GoBag>, ApiError> {
    Ok(Json(state.go_bag_service.pack(user.0.id, item_id).await?))
}

async fn unpack_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(item_id): Path<i64>,
) -> Result<Json<GoBag>, ApiError> {
    Ok(Json(state.go_bag_service.unpack(user.0.id, item_id).await?))
}

async fn create_item(
    State(state): State<AppState>,
    Json(body): Json<GoBagItemInput>,
) -> Result<(StatusCode, Json<GoBagItem>), ApiError> {
    let item = state.go_bag_service.create_item(body).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<GoBagItemInput>,
) -> Result<Json<GoBagItem>, ApiError> {
    Ok(Json(state.go_bag_service.update_item(id, body).await?))
}

async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.go_bag_service.delete_item(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
