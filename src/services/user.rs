//! User service
//!
//! Accounts and authentication:
//! - registration (the very first account becomes super admin)
//! - login/logout with opaque session tokens and login rate limiting
//! - profile, password and avatar changes
//! - password reset by emailed code
//! - super-admin user management (roles, bans)

use crate::cache::{CacheLayer, SharedCache, LEADERBOARD_PATTERN};
use crate::db::repositories::{PostRepository, SessionRepository, UserRepository};
use crate::models::{
    ListParams, Location, LocationScope, PagedResult, PasswordReset, PublicProfile, Session, UpdateProfileInput,
    User, UserListFilter, UserRole, UserStatus,
};
use crate::services::email::{generate_reset_code, EmailService, RESET_CODE_MINUTES};
use crate::services::error::{ServiceError, ServiceResult};
use crate::services::image_host::{delete_quietly, DynImageHost};
use crate::services::password::{hash_password, password_problem, verify_password};
use crate::services::rate_limiter::LoginRateLimiter;
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use uuid::Uuid;

const DEFAULT_SESSION_EXPIRATION_DAYS: i64 = 7;

const MAX_NAME_LENGTH: usize = 80;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

/// Input for registration
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub name: String,
    pub email: String,
    pub password: String,
    pub province: String,
    pub city: String,
    #[serde(default)]
    pub barangay: String,
}

/// Input for login
#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

/// A signed-in user and the token that identifies the session
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub user: User,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// User service for managing users and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    post_repo: Arc<dyn PostRepository>,
    images: DynImageHost,
    email: Arc<EmailService>,
    rate_limiter: Arc<LoginRateLimiter>,
    cache: SharedCache,
    session_expiration_days: i64,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        post_repo: Arc<dyn PostRepository>,
        images: DynImageHost,
        email: Arc<EmailService>,
        rate_limiter: Arc<LoginRateLimiter>,
        cache: SharedCache,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            post_repo,
            images,
            email,
            rate_limiter,
            cache,
            session_expiration_days: DEFAULT_SESSION_EXPIRATION_DAYS,
        }
    }

    pub fn with_session_expiration(mut self, days: i64) -> Self {
        self.session_expiration_days = days.max(1);
        self
    }

    /// Register a new account and sign it in.
    ///
    /// The first account ever created is a super admin; everyone after that
    /// starts as a citizen.
    pub async fn register(&self, input: RegisterInput) -> ServiceResult<AuthSession> {
        let name = validate_name(&input.name)?;
        let email = validate_email(&input.email)?;
        if let Some(problem) = password_problem(&input.password) {
            return Err(ServiceError::Validation(problem));
        }
        let location = Location::new(
            input.province.trim(),
            input.city.trim(),
            input.barangay.trim(),
        );
        if !location.is_complete() {
            return Err(ServiceError::validation("Province and city are required"));
        }

        if self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(ServiceError::Conflict("Email is already registered".to_string()));
        }

        let is_first = self.user_repo.count().await.context("Failed to count users")? == 0;
        let role = if is_first { UserRole::SuperAdmin } else { UserRole::Citizen };

        let password_hash = hash_password(&input.password)?;
        let user = User::new(name, email, password_hash, role, location);
        let user = self
            .user_repo
            .create(&user)
            .await
            .map_err(|e| ServiceError::from_insert(e, "Email is already registered"))?;

        tracing::info!(user_id = user.id, role = %user.role, "User registered");
        self.invalidate_leaderboard().await;

        let session = self.create_session(user.id).await?;
        Ok(AuthSession {
            user,
            token: session.id,
            expires_at: session.expires_at,
        })
    }

    /// Check credentials and open a session.
    ///
    /// Failures are counted per email; requests are counted per client IP.
    pub async fn login(&self, input: LoginInput, ip: Option<IpAddr>) -> ServiceResult<AuthSession> {
        if let Some(ip) = ip {
            if self.rate_limiter.is_ip_limited(ip).await {
                return Err(ServiceError::RateLimited(
                    "Too many requests, please wait a minute".to_string(),
                ));
            }
            self.rate_limiter.record_ip_request(ip).await;
        }
        if self.rate_limiter.is_email_limited(&input.email).await {
            return Err(ServiceError::RateLimited(
                "Too many failed attempts, try again in 15 minutes".to_string(),
            ));
        }

        let user = self
            .user_repo
            .get_by_email(input.email.trim())
            .await
            .context("Failed to get user by email")?;

        let user = match user {
            Some(user) if verify_password(&input.password, &user.password_hash)? => user,
            _ => {
                self.rate_limiter.record_failed_attempt(&input.email).await;
                return Err(ServiceError::Unauthorized(
                    "Invalid email or password".to_string(),
                ));
            }
        };

        if user.is_banned() {
            return Err(ServiceError::Banned("This account has been banned".to_string()));
        }

        self.rate_limiter.clear_email_attempts(&input.email).await;
        let session = self.create_session(user.id).await?;
        tracing::info!(user_id = user.id, "User logged in");

        Ok(AuthSession {
            user,
            token: session.id,
            expires_at: session.expires_at,
        })
    }

    pub async fn logout(&self, token: &str) -> ServiceResult<()> {
        self.session_repo
            .delete(token)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// The user behind a session token.
    ///
    /// Unknown or expired tokens yield `None`; a banned account is an error
    /// and loses the session.
    pub async fn validate_session(&self, token: &str) -> ServiceResult<Option<User>> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            if let Err(e) = self.session_repo.delete(token).await {
                tracing::warn!(error = %e, "Failed to delete expired session");
            }
            return Ok(None);
        }

        let user = match self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?
        {
            Some(user) => user,
            None => return Ok(None),
        };

        if user.is_banned() {
            self.session_repo
                .delete_by_user(user.id)
                .await
                .context("Failed to revoke sessions")?;
            return Err(ServiceError::Banned("This account has been banned".to_string()));
        }

        Ok(Some(user))
    }

    pub async fn get_user(&self, id: i64) -> ServiceResult<User> {
        self.user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?
            .ok_or_else(|| ServiceError::not_found("User"))
    }

    pub async fn public_profile(&self, id: i64) -> ServiceResult<PublicProfile> {
        let user = self.get_user(id).await?;
        let post_count = self
            .post_repo
            .count_by_user(id)
            .await
            .context("Failed to count posts")?;

        Ok(PublicProfile {
            id: user.id,
            name: user.name,
            role: user.role,
            province: user.location.province,
            city: user.location.city,
            points: user.points,
            avatar_url: user.avatar_url,
            post_count,
        })
    }

    pub async fn update_profile(&self, user: &User, input: UpdateProfileInput) -> ServiceResult<User> {
        let mut updated = user.clone();
        if let Some(name) = input.name {
            updated.name = validate_name(&name)?;
        }
        if let Some(province) = input.province {
            updated.location.province = province.trim().to_string();
        }
        if let Some(city) = input.city {
            updated.location.city = city.trim().to_string();
        }
        if let Some(barangay) = input.barangay {
            updated.location.barangay = barangay.trim().to_string();
        }
        if !updated.location.is_complete() {
            return Err(ServiceError::validation("Province and city are required"));
        }

        let moved = updated.location != user.location;
        let updated = self
            .user_repo
            .update(&updated)
            .await
            .context("Failed to update user")?;
        if moved || updated.name != user.name {
            self.invalidate_leaderboard().await;
        }
        Ok(updated)
    }

    /// Change password; every other session of the user is signed out.
    pub async fn change_password(
        &self,
        user: &User,
        current_token: &str,
        current_password: &str,
        new_password: &str,
    ) -> ServiceResult<()> {
        if !verify_password(current_password, &user.password_hash)? {
            return Err(ServiceError::validation("Current password is incorrect"));
        }
        if let Some(problem) = password_problem(new_password) {
            return Err(ServiceError::Validation(problem));
        }

        let mut updated = user.clone();
        updated.password_hash = hash_password(new_password)?;
        self.user_repo
            .update(&updated)
            .await
            .context("Failed to update password")?;

        let revoked = self
            .session_repo
            .delete_others(user.id, current_token)
            .await
            .context("Failed to revoke sessions")?;
        tracing::info!(user_id = user.id, revoked, "Password changed");
        Ok(())
    }

    /// Store a new avatar and drop the previous one from the image host
    pub async fn upload_avatar(&self, user: &User, data: &[u8], content_type: &str) -> ServiceResult<User> {
        let image = self
            .images
            .upload(data, content_type)
            .await
            .context("Failed to upload avatar")?;

        let mut updated = user.clone();
        updated.avatar_url = Some(image.url);
        updated.avatar_public_id = Some(image.public_id);
        let updated = self
            .user_repo
            .update(&updated)
            .await
            .context("Failed to save avatar")?;

        delete_quietly(self.images.as_ref(), user.avatar_public_id.as_deref()).await;
        Ok(updated)
    }

    /// Email a reset code if the address belongs to an account.
    ///
    /// Always succeeds for unknown addresses so accounts cannot be enumerated.
    pub async fn request_password_reset(&self, email: &str, ip: Option<IpAddr>) -> ServiceResult<()> {
        if let Some(ip) = ip {
            if self.rate_limiter.is_ip_limited(ip).await {
                return Err(ServiceError::RateLimited(
                    "Too many requests, please wait a minute".to_string(),
                ));
            }
            self.rate_limiter.record_ip_request(ip).await;
        }

        let email = email.trim().to_lowercase();
        let user = match self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to get user by email")?
        {
            Some(user) if !user.is_banned() => user,
            _ => {
                tracing::debug!("Password reset requested for unknown or banned account");
                return Ok(());
            }
        };

        let reset = PasswordReset {
            email: user.email.clone(),
            code: generate_reset_code(),
            expires_at: Utc::now() + Duration::minutes(RESET_CODE_MINUTES),
        };
        self.session_repo
            .put_reset(&reset)
            .await
            .context("Failed to store reset code")?;

        if let Err(e) = self.email.send_reset_code(&user.email, &reset.code).await {
            tracing::warn!(user_id = user.id, error = %e, "Failed to send reset code");
        }
        Ok(())
    }

    /// Consume a reset code and set a new password; all sessions are dropped.
    ///
    /// Wrong codes are counted per email. Once the limit is hit the pending
    /// code is thrown away and a fresh one has to be requested.
    pub async fn reset_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
        ip: Option<IpAddr>,
    ) -> ServiceResult<()> {
        if let Some(ip) = ip {
            if self.rate_limiter.is_ip_limited(ip).await {
                return Err(ServiceError::RateLimited(
                    "Too many requests, please wait a minute".to_string(),
                ));
            }
            self.rate_limiter.record_ip_request(ip).await;
        }
        let email = email.trim().to_lowercase();
        if self.rate_limiter.is_reset_limited(&email).await {
            return Err(ServiceError::RateLimited(
                "Too many wrong codes, request a new one in 15 minutes".to_string(),
            ));
        }
        let invalid = || ServiceError::validation("Invalid or expired reset code");

        let reset = self
            .session_repo
            .get_reset(&email)
            .await
            .context("Failed to get reset code")?
            .ok_or_else(invalid)?;
        if reset.is_expired() {
            self.session_repo
                .delete_reset(&email)
                .await
                .context("Failed to delete reset code")?;
            return Err(invalid());
        }
        if reset.code != code.trim() {
            self.rate_limiter.record_failed_reset(&email).await;
            if self.rate_limiter.is_reset_limited(&email).await {
                self.session_repo
                    .delete_reset(&email)
                    .await
                    .context("Failed to delete reset code")?;
                tracing::warn!("Reset code discarded after repeated wrong guesses");
            }
            return Err(invalid());
        }
        if let Some(problem) = password_problem(new_password) {
            return Err(ServiceError::Validation(problem));
        }

        let mut user = self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to get user by email")?
            .ok_or_else(invalid)?;
        user.password_hash = hash_password(new_password)?;
        self.user_repo
            .update(&user)
            .await
            .context("Failed to update password")?;

        self.session_repo
            .delete_reset(&email)
            .await
            .context("Failed to delete reset code")?;
        self.session_repo
            .delete_by_user(user.id)
            .await
            .context("Failed to revoke sessions")?;

        self.rate_limiter.clear_reset_attempts(&email).await;
        tracing::info!(user_id = user.id, "Password reset");
        Ok(())
    }

    // ========================================================================
    // Super-admin user management
    // ========================================================================

    /// Users visible to `viewer`: everyone for a super admin, the LGU's own
    /// province and city otherwise
    pub async fn list_users(
        &self,
        viewer: &User,
        mut filter: UserListFilter,
        params: ListParams,
    ) -> ServiceResult<PagedResult<User>> {
        match viewer.scope() {
            LocationScope::All => {}
            LocationScope::City { province, city } => {
                filter.province = Some(province);
                filter.city = Some(city);
            }
            LocationScope::None => {
                return Err(ServiceError::forbidden("LGU privileges required"));
            }
        }
        let (users, total) = self
            .user_repo
            .list(&filter, &params)
            .await
            .context("Failed to list users")?;
        Ok(PagedResult::new(users, total, &params))
    }

    /// Change a user's role. Promoting to LGU needs a city to scope to.
    pub async fn change_role(&self, admin: &User, id: i64, role: UserRole) -> ServiceResult<User> {
        if admin.id == id {
            return Err(ServiceError::validation("You cannot change your own role"));
        }
        let mut user = self.get_user(id).await?;
        if role == UserRole::Lgu && !user.location.is_complete() {
            return Err(ServiceError::validation(
                "An LGU account needs a province and city",
            ));
        }
        if user.role == role {
            return Ok(user);
        }

        user.role = role;
        let user = self
            .user_repo
            .update(&user)
            .await
            .context("Failed to update role")?;
        tracing::info!(admin_id = admin.id, user_id = id, role = %role, "Role changed");
        self.invalidate_leaderboard().await;
        Ok(user)
    }

    /// Ban or unban; banning signs the user out everywhere
    pub async fn set_banned(&self, admin: &User, id: i64, banned: bool) -> ServiceResult<User> {
        if admin.id == id {
            return Err(ServiceError::validation("You cannot ban yourself"));
        }
        let mut user = self.get_user(id).await?;
        user.status = if banned { UserStatus::Banned } else { UserStatus::Active };
        let user = self
            .user_repo
            .update(&user)
            .await
            .context("Failed to update status")?;

        if banned {
            self.session_repo
                .delete_by_user(id)
                .await
                .context("Failed to revoke sessions")?;
        }
        tracing::info!(admin_id = admin.id, user_id = id, banned, "User status changed");
        self.invalidate_leaderboard().await;
        Ok(user)
    }

    /// Drop expired sessions and reset codes; returns how many of each
    pub async fn cleanup_expired(&self) -> ServiceResult<(i64, i64)> {
        let sessions = self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?;
        let resets = self
            .session_repo
            .delete_expired_resets()
            .await
            .context("Failed to delete expired reset codes")?;
        self.rate_limiter.cleanup().await;
        Ok((sessions, resets))
    }

    // ========================================================================
    // Private helper methods
    // ========================================================================

    async fn create_session(&self, user_id: i64) -> ServiceResult<Session> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().simple().to_string(),
            user_id,
            expires_at: now + Duration::days(self.session_expiration_days),
            created_at: now,
        };
        let session = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;
        Ok(session)
    }

    async fn invalidate_leaderboard(&self) {
        if let Err(e) = self.cache.delete_pattern(LEADERBOARD_PATTERN).await {
            tracing::warn!(error = %e, "Failed to invalidate leaderboard cache");
        }
    }
}

fn validate_name(name: &str) -> ServiceResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ServiceError::validation("Name cannot be empty"));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ServiceError::Validation(format!(
            "Name must be at most {} characters",
            MAX_NAME_LENGTH
        )));
    }
    Ok(name.to_string())
}

fn validate_email(email: &str) -> ServiceResult<String> {
    let email = email.trim().to_lowercase();
    if !EMAIL_RE.is_match(&email) {
        return Err(ServiceError::validation("Invalid email format"));
    }
    Ok(email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::config::EmailConfig;
    use crate::db::repositories::{SqlxPostRepository, SqlxSessionRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::services::image_host::LocalImageHost;
    use std::str::FromStr;

    struct Harness {
        _dir: tempfile::TempDir,
        pool: DynDatabasePool,
        service: UserService,
    }

    async fn setup_test_service() -> Harness {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let dir = tempfile::tempdir().unwrap();
        let service = UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
            SqlxPostRepository::boxed(pool.clone()),
            Arc::new(LocalImageHost::new(dir.path().to_path_buf(), "/uploads".to_string())),
            Arc::new(EmailService::new(EmailConfig::default())),
            Arc::new(LoginRateLimiter::new()),
            Arc::new(MemoryCache::new()),
        );
        Harness { _dir: dir, pool, service }
    }

    fn input(name: &str, email: &str) -> RegisterInput {
        RegisterInput {
            name: name.to_string(),
            email: email.to_string(),
            password: "password123".to_string(),
            province: "Albay".to_string(),
            city: "Legazpi".to_string(),
            barangay: "Bitano".to_string(),
        }
    }

    fn login(email: &str, password: &str) -> LoginInput {
        LoginInput {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_first_user_is_super_admin() {
        let h = setup_test_service().await;
        let first = h.service.register(input("Admin", "admin@example.ph")).await.unwrap();
        let second = h.service.register(input("Lito", "lito@example.ph")).await.unwrap();

        assert_eq!(first.user.role, UserRole::SuperAdmin);
        assert_eq!(second.user.role, UserRole::Citizen);
        assert!(!second.token.is_empty());
    }

    #[tokio::test]
    async fn test_register_validation() {
        let h = setup_test_service().await;

        let mut bad = input("", "a@example.ph");
        assert!(matches!(h.service.register(bad.clone()).await, Err(ServiceError::Validation(_))));

        bad = input("Ana", "not-an-email");
        assert!(matches!(h.service.register(bad).await, Err(ServiceError::Validation(_))));

        bad = input("Ana", "ana@example.ph");
        bad.password = "short".to_string();
        assert!(matches!(h.service.register(bad).await, Err(ServiceError::Validation(_))));

        bad = input("Ana", "ana@example.ph");
        bad.city = "  ".to_string();
        assert!(matches!(h.service.register(bad).await, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_register_duplicate_email_conflicts() {
        let h = setup_test_service().await;
        h.service.register(input("Ana", "ana@example.ph")).await.unwrap();
        let err = h.service.register(input("Ana 2", "ANA@example.ph")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_login_and_validate_session() {
        let h = setup_test_service().await;
        h.service.register(input("Ana", "ana@example.ph")).await.unwrap();

        let auth = h.service.login(login("ana@example.ph", "password123"), None).await.unwrap();
        let user = h.service.validate_session(&auth.token).await.unwrap().unwrap();
        assert_eq!(user.email, "ana@example.ph");

        h.service.logout(&auth.token).await.unwrap();
        assert!(h.service.validate_session(&auth.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_login_wrong_password_and_unknown_email() {
        let h = setup_test_service().await;
        h.service.register(input("Ana", "ana@example.ph")).await.unwrap();

        let wrong = h.service.login(login("ana@example.ph", "nope-nope"), None).await;
        assert!(matches!(wrong, Err(ServiceError::Unauthorized(_))));
        let unknown = h.service.login(login("who@example.ph", "password123"), None).await;
        assert!(matches!(unknown, Err(ServiceError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_login_rate_limited_after_five_failures() {
        let h = setup_test_service().await;
        h.service.register(input("Ana", "ana@example.ph")).await.unwrap();

        for _ in 0..5 {
            let _ = h.service.login(login("ana@example.ph", "wrong-password"), None).await;
        }
        let err = h
            .service
            .login(login("ana@example.ph", "password123"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::RateLimited(_)));
    }

    #[tokio::test]
    async fn test_ip_rate_limit() {
        let h = setup_test_service().await;
        let ip = IpAddr::from_str("192.0.2.4").unwrap();
        for _ in 0..10 {
            let _ = h.service.login(login("x@example.ph", "whatever1"), Some(ip)).await;
        }
        let err = h.service.login(login("y@example.ph", "whatever1"), Some(ip)).await.unwrap_err();
        assert!(matches!(err, ServiceError::RateLimited(_)));
    }

    #[tokio::test]
    async fn test_banned_user_cannot_login_and_loses_sessions() {
        let h = setup_test_service().await;
        let admin = h.service.register(input("Admin", "admin@example.ph")).await.unwrap().user;
        let citizen = h.service.register(input("Ana", "ana@example.ph")).await.unwrap();

        h.service.set_banned(&admin, citizen.user.id, true).await.unwrap();

        assert!(h.service.validate_session(&citizen.token).await.unwrap().is_none());
        let err = h.service.login(login("ana@example.ph", "password123"), None).await.unwrap_err();
        assert!(matches!(err, ServiceError::Banned(_)));

        h.service.set_banned(&admin, citizen.user.id, false).await.unwrap();
        assert!(h.service.login(login("ana@example.ph", "password123"), None).await.is_ok());
    }

    #[tokio::test]
    async fn test_cannot_ban_self() {
        let h = setup_test_service().await;
        let admin = h.service.register(input("Admin", "admin@example.ph")).await.unwrap().user;
        let err = h.service.set_banned(&admin, admin.id, true).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_expired_session_is_rejected() {
        let h = setup_test_service().await;
        let auth = h.service.register(input("Ana", "ana@example.ph")).await.unwrap();
        sqlx::query("UPDATE sessions SET expires_at = ?")
            .bind(Utc::now() - Duration::hours(1))
            .execute(h.pool.sqlite())
            .await
            .unwrap();

        assert!(h.service.validate_session(&auth.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_change_password_revokes_other_sessions() {
        let h = setup_test_service().await;
        let first = h.service.register(input("Ana", "ana@example.ph")).await.unwrap();
        let second = h.service.login(login("ana@example.ph", "password123"), None).await.unwrap();

        let err = h
            .service
            .change_password(&first.user, &first.token, "wrong-current", "newpassword1")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        h.service
            .change_password(&first.user, &first.token, "password123", "newpassword1")
            .await
            .unwrap();

        assert!(h.service.validate_session(&first.token).await.unwrap().is_some());
        assert!(h.service.validate_session(&second.token).await.unwrap().is_none());
        assert!(h.service.login(login("ana@example.ph", "newpassword1"), None).await.is_ok());
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let h = setup_test_service().await;
        let auth = h.service.register(input("Ana", "ana@example.ph")).await.unwrap();

        // unknown address is silently accepted
        h.service.request_password_reset("nobody@example.ph", None).await.unwrap();

        h.service.request_password_reset("Ana@example.ph", None).await.unwrap();
        let code: String = sqlx::query_scalar("SELECT code FROM password_resets WHERE email = ?")
            .bind("ana@example.ph")
            .fetch_one(h.pool.sqlite())
            .await
            .unwrap();

        let wrong = if code == "000000" { "111111" } else { "000000" };
        let err = h
            .service
            .reset_password("ana@example.ph", wrong, "brandnew123", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        h.service
            .reset_password("ana@example.ph", &code, "brandnew123", None)
            .await
            .unwrap();

        assert!(h.service.validate_session(&auth.token).await.unwrap().is_none());
        assert!(h.service.login(login("ana@example.ph", "brandnew123"), None).await.is_ok());

        // single use
        let reused = h.service.reset_password("ana@example.ph", &code, "another123", None).await;
        assert!(matches!(reused, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_reset_code_discarded_after_wrong_guesses() {
        let h = setup_test_service().await;
        h.service.register(input("Ana", "ana@example.ph")).await.unwrap();
        h.service.request_password_reset("ana@example.ph", None).await.unwrap();
        let code: String = sqlx::query_scalar("SELECT code FROM password_resets WHERE email = ?")
            .bind("ana@example.ph")
            .fetch_one(h.pool.sqlite())
            .await
            .unwrap();

        let guesses = (0..6)
            .map(|n| format!("{:06}", n))
            .filter(|guess| *guess != code)
            .take(5);
        for guess in guesses {
            let err = h
                .service
                .reset_password("ana@example.ph", &guess, "brandnew123", None)
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::Validation(_)));
        }

        // the real code no longer works
        let err = h
            .service
            .reset_password("ana@example.ph", &code, "brandnew123", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::RateLimited(_)));
        let left: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM password_resets WHERE email = ?")
            .bind("ana@example.ph")
            .fetch_one(h.pool.sqlite())
            .await
            .unwrap();
        assert_eq!(left, 0);
        assert!(h.service.login(login("ana@example.ph", "password123"), None).await.is_ok());
    }

    #[tokio::test]
    async fn test_reset_is_ip_limited() {
        let h = setup_test_service().await;
        let ip: IpAddr = "203.0.113.9".parse().unwrap();
        for _ in 0..10 {
            let err = h
                .service
                .reset_password("nobody@example.ph", "123456", "brandnew123", Some(ip))
                .await
                .unwrap_err();
            assert!(!matches!(err, ServiceError::RateLimited(_)));
        }
        let err = h
            .service
            .reset_password("other@example.ph", "123456", "brandnew123", Some(ip))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::RateLimited(_)));
    }

    #[tokio::test]
    async fn test_update_profile() {
        let h = setup_test_service().await;
        let user = h.service.register(input("Ana", "ana@example.ph")).await.unwrap().user;

        let updated = h
            .service
            .update_profile(
                &user,
                UpdateProfileInput {
                    name: Some("  Ana Reyes ".to_string()),
                    city: Some("Daraga".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Ana Reyes");
        assert_eq!(updated.location.city, "Daraga");
        assert_eq!(updated.location.province, "Albay");

        let err = h
            .service
            .update_profile(
                &updated,
                UpdateProfileInput {
                    city: Some("".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_upload_avatar_replaces_previous() {
        let h = setup_test_service().await;
        let user = h.service.register(input("Ana", "ana@example.ph")).await.unwrap().user;

        let first = h.service.upload_avatar(&user, b"one", "image/png").await.unwrap();
        let first_file = h._dir.path().join(first.avatar_public_id.clone().unwrap());
        assert!(first_file.exists());

        let second = h.service.upload_avatar(&first, b"two", "image/jpeg").await.unwrap();
        assert!(second.avatar_url.unwrap().ends_with(".jpg"));
        assert!(!first_file.exists());
    }

    #[tokio::test]
    async fn test_change_role_to_lgu() {
        let h = setup_test_service().await;
        let admin = h.service.register(input("Admin", "admin@example.ph")).await.unwrap().user;
        let citizen = h.service.register(input("Ana", "ana@example.ph")).await.unwrap().user;

        let lgu = h.service.change_role(&admin, citizen.id, UserRole::Lgu).await.unwrap();
        assert_eq!(lgu.role, UserRole::Lgu);

        let err = h.service.change_role(&admin, admin.id, UserRole::Citizen).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_public_profile_and_listing() {
        let h = setup_test_service().await;
        let admin = h.service.register(input("Admin", "admin@example.ph")).await.unwrap().user;
        let ana = h.service.register(input("Ana", "ana@example.ph")).await.unwrap().user;

        let profile = h.service.public_profile(ana.id).await.unwrap();
        assert_eq!(profile.name, "Ana");
        assert_eq!(profile.post_count, 0);
        assert!(matches!(h.service.public_profile(999).await, Err(ServiceError::NotFound(_))));

        let page = h
            .service
            .list_users(
                &admin,
                UserListFilter {
                    search: Some("ana".to_string()),
                    ..Default::default()
                },
                ListParams::default(),
            )
            .await
            .unwrap();
        assert_eq!(page.total, 1);

        assert!(matches!(
            h.service
                .list_users(&ana, UserListFilter::default(), ListParams::default())
                .await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_lgu_listing_is_scoped_to_own_city() {
        let h = setup_test_service().await;
        let admin = h.service.register(input("Admin", "admin@example.ph")).await.unwrap().user;
        let lgu = h.service.register(input("Mayor", "mayor@example.ph")).await.unwrap().user;
        let lgu = h.service.change_role(&admin, lgu.id, UserRole::Lgu).await.unwrap();
        h.service.register(input("Ana", "ana@example.ph")).await.unwrap();
        let mut elsewhere = input("Ben", "ben@example.ph");
        elsewhere.city = "Daraga".to_string();
        h.service.register(elsewhere).await.unwrap();

        // asking for another city does not widen the scope
        let page = h
            .service
            .list_users(
                &lgu,
                UserListFilter {
                    city: Some("Daraga".to_string()),
                    ..Default::default()
                },
                ListParams::default(),
            )
            .await
            .unwrap();
        assert!(page.items.iter().all(|u| u.location.city == "Legazpi"));
        assert_eq!(page.total, 3);
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let h = setup_test_service().await;
        h.service.register(input("Ana", "ana@example.ph")).await.unwrap();
        sqlx::query("UPDATE sessions SET expires_at = ?")
            .bind(Utc::now() - Duration::hours(1))
            .execute(h.pool.sqlite())
            .await
            .unwrap();

        let (sessions, resets) = h.service.cleanup_expired().await.unwrap();
        assert_eq!(sessions, 1);
        assert_eq!(resets, 0);
    }
}
