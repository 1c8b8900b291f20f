//! Leaderboard API endpoints
//!
//! - GET /api/v1/leaderboard?scope=global|province|city&province=&city=&page=&per_page=
//! - GET /api/v1/leaderboard/me - The caller's rank

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{default_page, default_per_page};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};
use crate::models::{LeaderboardEntry, LeaderboardScope, ListParams, MyRank, PagedResult};

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    #[serde(default)]
    pub scope: LeaderboardScope,
    pub province: Option<String>,
    pub city: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/", get(get_leaderboard))
}

pub fn protected_router() -> Router<AppState> {
    Router::new().route("/me", get(get_my_rank))
}

/// A province or city scope without a place uses the caller's own
async fn get_leaderboard(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<PagedResult<LeaderboardEntry>>, ApiError> {
    let page = state
        .leaderboard_service
        .leaderboard(
            query.scope,
            query.province,
            query.city,
            viewer.as_ref(),
            ListParams::new(query.page, query.per_page),
        )
        .await?;
    Ok(Json(page))
}

async fn get_my_rank(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<MyRank>, ApiError> {
    Ok(Json(state.leaderboard_service.my_rank(&user.0).await?))
}
