//! Learning module API endpoints
//!
//! - GET /api/v1/modules - Published modules (staff also see drafts)
//! - GET /api/v1/modules/completed - Ids of modules the caller finished
//! - GET /api/v1/modules/{id} - One module
//! - POST /api/v1/modules/{id}/complete - Mark complete, first time pays points
//! - POST /api/v1/modules - Create (LGU)
//! - PUT /api/v1/modules/{id} - Update (author or super admin)
//! - DELETE /api/v1/modules/{id} - Delete (author or super admin)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};

use crate::api::common::PaginationQuery;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{CreateModuleInput, Module, ModuleCompletion, PagedResult, UpdateModuleInput};

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_modules))
        .route("/completed", get(completed_modules))
        .route("/{id}", get(get_module))
        .route("/{id}/complete", post(complete_module))
}

pub fn staff_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_module))
        .route("/{id}", put(update_module).delete(delete_module))
}

async fn list_modules(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PagedResult<Module>>, ApiError> {
    Ok(Json(
        state
            .module_service
            .list_modules(&user.0, (&query).into())
            .await?,
    ))
}

async fn completed_modules(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<i64>>, ApiError> {
    Ok(Json(state.module_service.completed_modules(&user.0).await?))
}

async fn get_module(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Module>, ApiError> {
    Ok(Json(state.module_service.get_module(id, &user.0).await?))
}

async fn complete_module(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<ModuleCompletion>, ApiError> {
    Ok(Json(state.module_service.complete_module(&user.0, id).await?))
}

async fn create_module(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateModuleInput>,
) -> Result<(StatusCode, Json<Module>), ApiError> {
    let module = state.module_service.create_module(&user.0, body).await?;
    Ok((StatusCode::CREATED, Json(module)))
}

async fn update_module(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateModuleInput>,
) -> Result<Json<Module>, ApiError> {
    Ok(Json(state.module_service.update_module(&user.0, id, body).await?))
}

async fn delete_module(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.module_service.delete_module(&user.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
