//! Super admin API endpoints
//!
//! - GET /api/v1/admin/dashboard - Global readiness plus per-city breakdown
//! - GET /api/v1/admin/users - List users (`role`, `province`, `city`, `search`, paging)
//! - PUT /api/v1/admin/users/{id}/role - `{ role }`
//! - PUT /api/v1/admin/users/{id}/ban - `{ banned }`
//! - /api/v1/admin/go-bag/items - Catalog management

use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{default_page, default_per_page, non_empty};
use crate::api::go_bag;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{AdminDashboard, ListParams, PagedResult, User, UserListFilter, UserRole};

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub role: Option<UserRole>,
    pub province: Option<String>,
    pub city: Option<String>,
    pub search: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl UserListQuery {
    pub fn filter(&self) -> UserListFilter {
        UserListFilter {
            role: self.role,
            province: non_empty(self.province.clone()),
            city: non_empty(self.city.clone()),
            search: non_empty(self.search.clone()),
        }
    }

    pub fn params(&self) -> ListParams {
        ListParams::new(self.page, self.per_page)
    }
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: UserRole,
}

#[derive(Debug, Deserialize)]
pub struct BanRequest {
    pub banned: bool,
}

/// Build the admin router (require_auth + require_super_admin applied by caller)
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/users", get(list_users))
        .route("/users/{id}/role", put(change_role))
        .route("/users/{id}/ban", put(set_banned))
        .nest("/go-bag", go_bag::admin_router())
}

async fn dashboard(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<AdminDashboard>, ApiError> {
    Ok(Json(state.analytics_service.admin_dashboard(&user.0).await?))
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

async fn change_role(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<ChangeRoleRequest>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(
        state.user_service.change_role(&user.0, id, body.role).await?,
    ))
}

async fn set_banned(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<BanRequest>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(
        state.user_service.set_banned(&user.0, id, body.banned).await?,
    ))
}
