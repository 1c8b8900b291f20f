//! Quiz API endpoints
//!
//! - GET /api/v1/quizzes - Quizzes, optionally for one module
//! - GET /api/v1/quizzes/attempts - The caller's attempts (`quiz_id` filter)
//! - GET /api/v1/quizzes/{id} - A quiz without its answer key
//! - POST /api/v1/quizzes/{id}/attempts - Submit answers
//! - POST /api/v1/quizzes - Create (LGU)
//! - GET /api/v1/quizzes/{id}/answers - A quiz with its answer key (LGU)
//! - PUT /api/v1/quizzes/{id} - Update (author or super admin)
//! - DELETE /api/v1/quizzes/{id} - Delete (author or super admin)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{default_page, default_per_page};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{
    AttemptResult, CreateQuizInput, ListParams, PagedResult, Quiz, QuizAttempt, QuizView,
    QuizWithQuestions, UpdateQuizInput,
};

#[derive(Debug, Deserialize)]
pub struct QuizListQuery {
    pub module_id: Option<i64>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

#[derive(Debug, Deserialize)]
pub struct AttemptListQuery {
    pub quiz_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitAttemptRequest {
    pub answers: Vec<i64>,
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_quizzes))
        .route("/attempts", get(list_my_attempts))
        .route("/{id}", get(get_quiz))
        .route("/{id}/attempts", post(submit_attempt))
}

pub fn staff_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_quiz))
        .route("/{id}/answers", get(get_quiz_with_answers))
        .route("/{id}", put(update_quiz).delete(delete_quiz))
}

async fn list_quizzes(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<QuizListQuery>,
) -> Result<Json<PagedResult<Quiz>>, ApiError> {
    let params = ListParams::new(query.page, query.per_page);
    Ok(Json(
        state
            .quiz_service
            .list_quizzes(&user.0, query.module_id, params)
            .await?,
    ))
}

async fn list_my_attempts(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<AttemptListQuery>,
) -> Result<Json<Vec<QuizAttempt>>, ApiError> {
    Ok(Json(
        state
            .quiz_service
            .list_my_attempts(&user.0, query.quiz_id)
            .await?,
    ))
}

async fn get_quiz(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<QuizView>, ApiError> {
    Ok(Json(state.quiz_service.get_quiz(&user.0, id).await?))
}

async fn submit_attempt(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<SubmitAttemptRequest>,
) -> Result<(StatusCode, Json<AttemptResult>), ApiError> {
    let result = state
        .quiz_service
        .submit_attempt(&user.0, id, &body.answers)
        .await?;
    Ok((StatusCode::CREATED, Json(result)))
}

async fn create_quiz(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateQuizInput>,
) -> Result<(StatusCode, Json<QuizWithQuestions>), ApiError> {
    let quiz = state.quiz_service.create_quiz(&user.0, body).await?;
    Ok((StatusCode::CREATED, Json(quiz)))
}

async fn get_quiz_with_answers(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<QuizWithQuestions>, ApiError> {
    Ok(Json(
        state.quiz_service.get_quiz_with_answers(&user.0, id).await?,
    ))
}

async fn update_quiz(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateQuizInput>,
) -> Result<Json<QuizWithQuestions>, ApiError> {
    Ok(Json(state.quiz_service.update_quiz(&user.0, id, body).await?))
}

async fn delete_quiz(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.quiz_service.delete_quiz(&user.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
