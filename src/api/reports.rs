//! Moderation API endpoints
//!
//! Anyone signed in:
//! - POST /api/v1/reports - Report a post, module or user
//! - POST /api/v1/reports/questions - Report a quiz question
//!
//! LGU and super admin:
//! - GET /api/v1/reports - Content reports (`status`, paging), city scoped for LGUs
//! - GET /api/v1/reports/{id}
//! - POST /api/v1/reports/{id}/resolve - `{ note?, remove_content? }`
//! - POST /api/v1/reports/{id}/dismiss - `{ note? }`
//! - GET /api/v1/reports/questions - Question reports
//! - POST /api/v1/reports/questions/{id}/resolve
//! - POST /api/v1/reports/questions/{id}/dismiss

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{default_page, default_per_page};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{
    ContentReport, CreateContentReportInput, CreateQuestionReportInput, ListParams, PagedResult,
    QuestionReport, ReportStatus, ResolveReportInput,
};

#[derive(Debug, Deserialize)]
pub struct ReportListQuery {
    pub status: Option<ReportStatus>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct NoteRequest {
    pub note: Option<String>,
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/", post(report_content))
        .route("/questions", post(report_question))
}

pub fn staff_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_content_reports))
        .route("/questions", get(list_question_reports))
        .route("/questions/{id}/resolve", post(resolve_question_report))
        .route("/questions/{id}/dismiss", post(dismiss_question_report))
        .route("/{id}", get(get_content_report))
        .route("/{id}/resolve", post(resolve_content_report))
        .route("/{id}/dismiss", post(dismiss_content_report))
}

async fn report_content(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateContentReportInput>,
) -> Result<(StatusCode, Json<ContentReport>), ApiError> {
    let report = state.report_service.report_content(&user.0, body).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

async fn report_question(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateQuestionReportInput>,
) -> Result<(StatusCode, Json<QuestionReport>), ApiError> {
    let report = state.report_service.report_question(&user.0, body).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

async fn list_content_reports(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ReportListQuery>,
) -> Result<Json<PagedResult<ContentReport>>, ApiError> {
    let params = ListParams::new(query.page, query.per_page);
    Ok(Json(
        state
            .report_service
            .list_content_reports(&user.0, query.status, params)
            .await?,
    ))
}

async fn get_content_report(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<ContentReport>, ApiError> {
    Ok(Json(state.report_service.get_content_report(&user.0, id).await?))
}

async fn resolve_content_report(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<ResolveReportInput>,
) -> Result<Json<ContentReport>, ApiError> {
    Ok(Json(
        state
            .report_service
            .resolve_content_report(&user.0, id, body)
            .await?,
    ))
}

async fn dismiss_content_report(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<NoteRequest>,
) -> Result<Json<ContentReport>, ApiError> {
    Ok(Json(
        state
            .report_service
            .dismiss_content_report(&user.0, id, body.note)
            .await?,
    ))
}

async fn list_question_reports(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ReportListQuery>,
) -> Result<Json<PagedResult<QuestionReport>>, ApiError> {
    let params = ListParams::new(query.page, query.per_page);
    Ok(Json(
        state
            .report_service
            .list_question_reports(&user.0, query.status, params)
            .await?,
    ))
}

async fn resolve_question_report(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<NoteRequest>,
) -> Result<Json<QuestionReport>, ApiError> {
    Ok(Json(
        state
            .report_service
            .close_question_report(&user.0, id, ReportStatus::Resolved, body.note)
            .await?,
    ))
}

async fn dismiss_question_report(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<NoteRequest>,
) -> Result<Json<QuestionReport>, ApiError> {
    Ok(Json(
        state
            .report_service
            .close_question_report(&user.0, id, ReportStatus::Dismissed, body.note)
            .await?,
    ))
}
