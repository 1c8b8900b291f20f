//! Data models
//!
//! This module contains the data structures shared by repositories,
//! services and handlers:
//! - Database entities (User, Session, GoBagItem, Post, Rating, Module, Quiz, reports)
//! - API request inputs
//! - Read models for leaderboards and dashboards

mod analytics;
mod go_bag;
mod module;
mod paging;
mod post;
mod quiz;
mod report;
mod session;
mod user;

pub use analytics::{
    round1, AdminDashboard, CityBreakdown, ItemPackRate, LeaderboardEntry, LeaderboardScope,
    LguDashboard, MyRank, PublicProfile, ReadinessBuckets, ReadinessOverview,
};
pub use go_bag::{completion_percent, GoBag, GoBagEntry, GoBagItem, GoBagItemInput, ItemCategory};
pub use module::{CreateModuleInput, Module, ModuleCompletion, UpdateModuleInput};
pub use paging::{ListParams, PagedResult};
pub use post::{
    count_verified, points_for_verification, Post, PostAuthor, PostCard, PostDetail, PostFilter, Rating,
    RatingOutcome, SnapshotItem, SnapshotItemView, POINTS_PER_VERIFIED_ITEM,
};
pub use quiz::{
    grade, improvement_points, AttemptResult, CreateQuizInput, QuestionInput, QuestionResult,
    QuestionView, Quiz, QuizAttempt, QuizQuestion, QuizView, QuizWithQuestions, UpdateQuizInput,
};
pub use report::{
    ContentReport, CreateContentReportInput, CreateQuestionReportInput, QuestionReport,
    ReportStatus, ReportTarget, ResolveReportInput,
};
pub use session::{PasswordReset, Session};
pub use user::{Location, LocationScope, UpdateProfileInput, User, UserListFilter, UserRole, UserStatus};
