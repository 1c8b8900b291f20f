//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the queries for one area of the domain.

pub mod analytics;
pub mod go_bag;
pub mod leaderboard;
pub mod module;
pub mod post;
pub mod quiz;
pub mod report;
pub mod session;
pub mod user;

pub use analytics::{AnalyticsRepository, SqlxAnalyticsRepository, UserCounts};
pub use go_bag::{GoBagRepository, SqlxGoBagRepository};
pub use leaderboard::{LeaderboardRepository, Region, SqlxLeaderboardRepository};
pub use module::{ModuleRepository, SqlxModuleRepository};
pub use post::{NewPost, PostRepository, SqlxPostRepository};
pub use quiz::{QuizRepository, SqlxQuizRepository};
pub use report::{ReportRepository, SqlxReportRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use user::{SqlxUserRepository, UserRepository};
