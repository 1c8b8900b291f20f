//! LGU API endpoints, scoped to the caller's own city
//!
//! - GET /api/v1/lgu/dashboard - Readiness of the caller's city
//! - GET /api/v1/lgu/users - Residents of the caller's city

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};

use crate::api::admin::UserListQuery;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{LguDashboard, PagedResult, User};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/users", get(list_users))
}

async fn dashboard(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<LguDashboard>, ApiError> {
    Ok(Json(state.analytics_service.lgu_dashboard(&user.0).await?))
}

async fn list_users(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<UserListQuery>,
) -> Result<Json<PagedResult<User>>, ApiError> {
    Ok(Json(
        state
            .user_service
            .list_users(&user.0, query.filter(), query.params())
            .await?,
    ))
}
