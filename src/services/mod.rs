//! Services layer - Business logic
//!
//! Services implement the rules of each resource on top of the
//! repositories, the cache and the external collaborators (image host,
//! email). Handlers only ever talk to services.

pub mod analytics;
pub mod email;
pub mod error;
pub mod go_bag;
pub mod image_host;
pub mod leaderboard;
pub mod markdown;
pub mod module;
pub mod password;
pub mod post;
pub mod quiz;
pub mod rate_limiter;
pub mod report;
pub mod user;

pub use analytics::AnalyticsService;
pub use email::{generate_reset_code, EmailService};
pub use error::{ServiceError, ServiceResult};
pub use go_bag::GoBagService;
pub use image_host::{create_image_host, DynImageHost, HostedImage, ImageHost, LocalImageHost};
pub use leaderboard::LeaderboardService;
pub use markdown::MarkdownRenderer;
pub use module::ModuleService;
pub use password::{hash_password, verify_password};
pub use post::{CreatePostInput, ImageUpload, PostService, UpdatePostInput};
pub use quiz::QuizService;
pub use rate_limiter::LoginRateLimiter;
pub use report::ReportService;
pub use user::{AuthSession, LoginInput, RegisterInput, UserService};

use crate::cache::SharedCache;
use crate::config::Config;
use crate::db::repositories::{
    SqlxAnalyticsRepository, SqlxGoBagRepository, SqlxLeaderboardRepository, SqlxModuleRepository,
    SqlxPostRepository, SqlxQuizRepository, SqlxReportRepository, SqlxSessionRepository,
    SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use std::sync::Arc;

/// Every service, wired to one pool, cache and image host
#[derive(Clone)]
pub struct Services {
    pub users: Arc<UserService>,
    pub go_bag: Arc<GoBagService>,
    pub posts: Arc<PostService>,
    pub modules: Arc<ModuleService>,
    pub quizzes: Arc<QuizService>,
    pub leaderboard: Arc<LeaderboardService>,
    pub reports: Arc<ReportService>,
    pub analytics: Arc<AnalyticsService>,
}

impl Services {
    pub fn new(
        pool: DynDatabasePool,
        config: &Config,
        cache: SharedCache,
        images: DynImageHost,
    ) -> Self {
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let post_repo = SqlxPostRepository::boxed(pool.clone());
        let go_bag_repo = SqlxGoBagRepository::boxed(pool.clone());
        let module_repo = SqlxModuleRepository::boxed(pool.clone());

        let users = Arc::new(
            UserService::new(
                user_repo.clone(),
                SqlxSessionRepository::boxed(pool.clone()),
                post_repo.clone(),
                images.clone(),
                Arc::new(EmailService::new(config.email.clone())),
                Arc::new(LoginRateLimiter::new()),
                cache.clone(),
            )
            .with_session_expiration(config.auth.session_days),
        );
        let go_bag = Arc::new(GoBagService::new(go_bag_repo.clone(), cache.clone()));
        let posts = Arc::new(PostService::new(
            post_repo,
            go_bag_repo,
            user_repo.clone(),
            images,
            cache.clone(),
        ));
        let modules = Arc::new(ModuleService::new(module_repo.clone(), cache.clone()));
        let quizzes = Arc::new(QuizService::new(
            SqlxQuizRepository::boxed(pool.clone()),
            module_repo,
            cache.clone(),
        ));
        let leaderboard = Arc::new(LeaderboardService::new(
            SqlxLeaderboardRepository::boxed(pool.clone()),
            cache,
        ));
        let reports = Arc::new(ReportService::new(
            SqlxReportRepository::boxed(pool.clone()),
            user_repo,
            posts.clone(),
            modules.clone(),
            quizzes.clone(),
            users.clone(),
        ));
        let analytics = Arc::new(AnalyticsService::new(SqlxAnalyticsRepository::boxed(pool)));

        Self {
            users,
            go_bag,
            posts,
            modules,
            quizzes,
            leaderboard,
            reports,
            analytics,
        }
    }
}
