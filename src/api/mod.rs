//! API layer - HTTP handlers and routing
//!
//! Everything is served under `/api/v1`:
//! - Auth and profile endpoints
//! - Go bag, posts and community ratings
//! - Learning modules and quizzes
//! - Leaderboard
//! - Moderation reports
//! - LGU and super admin dashboards
//!
//! `/health` and the local upload directory sit outside the API prefix.

pub mod admin;
pub mod auth;
pub mod common;
pub mod go_bag;
pub mod leaderboard;
pub mod lgu;
pub mod middleware;
pub mod modules;
pub mod posts;
pub mod quizzes;
pub mod reports;
pub mod upload;
pub mod users;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware as axum_middleware,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, services::ServeDir, trace::TraceLayer,
};

use crate::config::{Config, ImageHostDriver};

pub use middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};

/// Build the main API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Super admin routes
    let admin_routes = Router::new()
        .nest("/admin", admin::router())
        .route_layer(axum_middleware::from_fn(middleware::require_super_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // LGU routes (super admins pass too)
    let staff_routes = Router::new()
        .nest("/lgu", lgu::router())
        .nest("/modules", modules::staff_router())
        .nest("/quizzes", quizzes::staff_router())
        .nest("/reports", reports::staff_router())
        .route_layer(axum_middleware::from_fn(middleware::require_lgu))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Protected routes (any signed-in account)
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .nest("/go-bag", go_bag::protected_router())
        .nest("/posts", posts::protected_router())
        .nest("/modules", modules::protected_router())
        .nest("/quizzes", quizzes::protected_router())
        .nest("/leaderboard", leaderboard::protected_router())
        .nest("/reports", reports::protected_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Public routes; a valid session is still picked up when present
    Router::new()
        .nest("/auth", auth::public_router())
        .nest("/users", users::public_router())
        .nest("/go-bag", go_bag::public_router())
        .nest("/posts", posts::public_router())
        .nest("/leaderboard", leaderboard::public_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::optional_auth,
        ))
        .merge(admin_routes)
        .merge(staff_routes)
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, config: &Config) -> Router {
    let mut router = Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .route("/health", get(health));

    if config.images.driver == ImageHostDriver::Local {
        let base = config.images.public_base.trim_end_matches('/');
        if base.starts_with('/') && base.len() > 1 {
            router = router.nest_service(base, ServeDir::new(&config.images.path));
        }
    }

    // Multipart bodies carry one image plus a few text fields
    let body_limit = config.upload.max_file_size as usize + 64 * 1024;

    router
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors_layer(&config.server.cors_origin))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS for the SPA origin, with credentials so the session cookie flows
fn cors_layer(origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);

    match origin.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin),
        Err(_) => {
            tracing::warn!(origin, "Invalid CORS origin, cross-origin requests will be refused");
            cors
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
}

/// GET /health
async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    match state.pool.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                database: "ok",
            }),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded",
                    database: "unreachable",
                }),
            )
        }
    }
}
