//! Authentication API endpoints
//!
//! - POST /api/v1/auth/register - Create an account and sign in
//! - POST /api/v1/auth/login - Sign in
//! - POST /api/v1/auth/logout - Sign out
//! - GET /api/v1/auth/me - Current user
//! - PUT /api/v1/auth/profile - Update name and location
//! - PUT /api/v1/auth/password - Change password
//! - POST /api/v1/auth/avatar - Upload a profile picture (multipart `image`)
//! - POST /api/v1/auth/forgot-password - Email a reset code
//! - POST /api/v1/auth/reset-password - Set a new password with the code

use axum::{
    extract::{ConnectInfo, FromRequestParts, Multipart, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, SessionToken};
use crate::api::upload::read_form;
use crate::models::{UpdateProfileInput, User};
use crate::services::{AuthSession, LoginInput, RegisterInput};

/// Response for successful authentication
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
    pub expires_at: String,
}

impl From<AuthSession> for AuthResponse {
    fn from(session: AuthSession) -> Self {
        Self {
            user: session.user,
            token: session.token,
            expires_at: session.expires_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub code: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// The caller's address: the socket peer, or the proxy headers when
/// `server.trust_proxy` is on
#[derive(Debug, Clone, Copy)]
pub struct ClientIp(pub Option<IpAddr>);

impl FromRequestParts<AppState> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(ClientIp(client_ip(&parts.headers, peer, state.trust_proxy)))
    }
}

/// Build protected auth routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(get_current_user))
        .route("/profile", put(update_profile))
        .route("/password", put(change_password))
        .route("/avatar", post(upload_avatar))
}

/// Build public auth routes (no auth required)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
}

/// POST /api/v1/auth/register
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterInput>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.user_service.register(body).await?;
    let headers = session_cookie(&session.token, state.session_days)?;
    Ok((StatusCode::CREATED, headers, Json(AuthResponse::from(session))))
}

/// POST /api/v1/auth/login
async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(body): Json<LoginInput>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.user_service.login(body, ip).await?;
    let headers = session_cookie(&session.token, state.session_days)?;
    Ok((headers, Json(AuthResponse::from(session))))
}

/// POST /api/v1/auth/logout
async fn logout(
    State(state): State<AppState>,
    SessionToken(token): SessionToken,
) -> Result<impl IntoResponse, ApiError> {
    state.user_service.logout(&token).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_static("session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
    );
    Ok((StatusCode::NO_CONTENT, headers))
}

/// GET /api/v1/auth/me
async fn get_current_user(user: AuthenticatedUser) -> Json<User> {
    Json(user.0)
}

/// PUT /api/v1/auth/profile
async fn update_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<UpdateProfileInput>,
) -> Result<Json<User>, ApiError> {
    let updated = state.user_service.update_profile(&user.0, body).await?;
    Ok(Json(updated))
}

/// PUT /api/v1/auth/password
///
/// Other sessions are signed out; the current one stays valid.
async fn change_password(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    SessionToken(token): SessionToken,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .user_service
        .change_password(&user.0, &token, &body.current_password, &body.new_password)
        .await?;
    Ok(Json(MessageResponse {
        message: "Password changed".to_string(),
    }))
}

/// POST /api/v1/auth/avatar
async fn upload_avatar(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> Result<Json<User>, ApiError> {
    let form = read_form(&mut multipart, "image", &state.upload_config).await?;
    let image = form
        .image
        .ok_or_else(|| ApiError::validation_error("No image provided"))?;
    let updated = state
        .user_service
        .upload_avatar(&user.0, &image.data, &image.content_type)
        .await?;
    Ok(Json(updated))
}

/// POST /api/v1/auth/forgot-password
///
/// Answers the same way whether or not the address has an account.
async fn forgot_password(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(body): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .user_service
        .request_password_reset(&body.email, ip)
        .await?;
    Ok(Json(MessageResponse {
        message: "If that address has an account, a reset code is on its way".to_string(),
    }))
}

/// POST /api/v1/auth/reset-password
async fn reset_password(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .user_service
        .reset_password(&body.email, &body.code, &body.new_password, ip)
        .await?;
    Ok(Json(MessageResponse {
        message: "Password has been reset, please sign in".to_string(),
    }))
}

fn session_cookie(token: &str, days: i64) -> Result<HeaderMap, ApiError> {
    let cookie = format!(
        "session={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        token,
        days * 24 * 60 * 60
    );
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie)
            .map_err(|_| ApiError::internal_error("Invalid session cookie"))?,
    );
    Ok(headers)
}

/// Extract IP address from proxy headers
fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>, trust_proxy: bool) -> Option<IpAddr> {
    if trust_proxy {
        extract_ip_address(headers).or(peer)
    } else {
        peer
    }
}

fn extract_ip_address(headers: &HeaderMap) -> Option<IpAddr> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|h| h.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            if let Ok(ip) = first.trim().parse() {
                return Some(ip);
            }
        }
    }
    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}
