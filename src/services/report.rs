//! Moderation queue
//!
//! Anyone signed in may report a post, module, user or quiz question.
//! Content reports carry the province and city of whoever owns the reported
//! thing, and an LGU only sees and handles reports for its own city. Question
//! reports go to every LGU and super admin.

use crate::db::repositories::{ReportRepository, UserRepository};
use crate::models::{
    ContentReport, CreateContentReportInput, CreateQuestionReportInput, ListParams, Location,
    PagedResult, QuestionReport, ReportStatus, ReportTarget, ResolveReportInput, User,
};
use crate::services::error::{ServiceError, ServiceResult};
use crate::services::module::ModuleService;
use crate::services::post::PostService;
use crate::services::quiz::QuizService;
use crate::services::user::UserService;
use anyhow::Context;
use std::sync::Arc;

const MAX_REASON_LENGTH: usize = 200;
const DUPLICATE_REPORT: &str = "You already have a pending report for this";

pub struct ReportService {
    reports: Arc<dyn ReportRepository>,
    users: Arc<dyn UserRepository>,
    posts: Arc<PostService>,
    modules: Arc<ModuleService>,
    quizzes: Arc<QuizService>,
    accounts: Arc<UserService>,
}

impl ReportService {
    pub fn new(
        reports: Arc<dyn ReportRepository>,
        users: Arc<dyn UserRepository>,
        posts: Arc<PostService>,
        modules: Arc<ModuleService>,
        quizzes: Arc<QuizService>,
        accounts: Arc<UserService>,
    ) -> Self {
        Self {
            reports,
            users,
            posts,
            modules,
            quizzes,
            accounts,
        }
    }

    pub async fn report_content(
        &self,
        reporter: &User,
        mut input: CreateContentReportInput,
    ) -> ServiceResult<ContentReport> {
        input.reason = validate_reason(&input.reason)?;
        input.details = clean_details(input.details);

        let owner_id = match input.target_type {
            ReportTarget::Post => Some(self.posts.find(input.target_id).await?.user_id),
            ReportTarget::Module => self.modules.find(input.target_id).await?.created_by,
            ReportTarget::User => {
                if input.target_id == reporter.id {
                    return Err(ServiceError::validation("You cannot report yourself"));
                }
                Some(input.target_id)
            }
        };
        let owner = match owner_id {
            Some(id) => self.users.get_by_id(id).await.context("Failed to get owner")?,
            None => None,
        };
        if input.target_type == ReportTarget::User && owner.is_none() {
            return Err(ServiceError::not_found("User"));
        }
        let place = owner.map(|o| o.location).unwrap_or_default();

        let report = self
            .reports
            .create_content(reporter.id, &input, &place)
            .await
            .map_err(|e| ServiceError::from_insert(e, DUPLICATE_REPORT))?;
        tracing::info!(
            report_id = report.id,
            target = %report.target_type,
            target_id = report.target_id,
            "Content reported"
        );
        Ok(report)
    }

    pub async fn report_question(
        &self,
        reporter: &User,
        mut input: CreateQuestionReportInput,
    ) -> ServiceResult<QuestionReport> {
        input.reason = validate_reason(&input.reason)?;
        input.details = clean_details(input.details);
        let question = self.quizzes.find_question(input.question_id).await?;

        let report = self
            .reports
            .create_question(reporter.id, question.quiz_id, &input)
            .await
            .map_err(|e| ServiceError::from_insert(e, DUPLICATE_REPORT))?;
        tracing::info!(report_id = report.id, question_id = question.id, "Question reported");
        Ok(report)
    }

    /// Oldest first; an LGU only sees its own city
    pub async fn list_content_reports(
        &self,
        staff: &User,
        status: Option<ReportStatus>,
        params: ListParams,
    ) -> ServiceResult<PagedResult<ContentReport>> {
        require_staff(staff)?;
        let scope = staff.scope();
        let (reports, total) = self
            .reports
            .list_content(status, scope.city_filter(), &params)
            .await
            .context("Failed to list reports")?;
        Ok(PagedResult::new(reports, total, &params))
    }

    pub async fn get_content_report(&self, staff: &User, id: i64) -> ServiceResult<ContentReport> {
        require_staff(staff)?;
        let report = self.find_content(id).await?;
        check_scope(staff, &report)?;
        Ok(report)
    }

    /// Close a report as resolved, optionally acting on its target.
    ///
    /// Removing a post deletes it, removing a module unpublishes it and
    /// removing a user bans them (super admin only). The report is claimed
    /// before the target is touched; if the action fails it goes back to
    /// pending.
    pub async fn resolve_content_report(
        &self,
        staff: &User,
        id: i64,
        input: ResolveReportInput,
    ) -> ServiceResult<ContentReport> {
        require_staff(staff)?;
        let report = self.find_content(id).await?;
        check_scope(staff, &report)?;
        if report.status != ReportStatus::Pending {
            return Err(ServiceError::validation("Only pending reports can be resolved"));
        }
        if input.remove_content && report.target_type == ReportTarget::User && !staff.is_super_admin() {
            return Err(ServiceError::forbidden("Only a super admin can ban users"));
        }

        let note = clean_details(input.note);
        self.claim(staff, report.id, ReportStatus::Resolved, note.as_deref()).await?;

        if input.remove_content {
            if let Err(e) = self.remove_target(staff, &report).await {
                if let Err(reopen) = self.reports.reopen_content(report.id, staff.id).await {
                    tracing::warn!(report_id = report.id, error = %reopen, "Failed to reopen report");
                }
                return Err(e);
            }
        }

        tracing::info!(
            report_id = report.id,
            removed = input.remove_content,
            by = staff.id,
            "Report resolved"
        );
        self.find_content(report.id).await
    }

    pub async fn dismiss_content_report(
        &self,
        staff: &User,
        id: i64,
        note: Option<String>,
    ) -> ServiceResult<ContentReport> {
        require_staff(staff)?;
        let report = self.find_content(id).await?;
        check_scope(staff, &report)?;
        self.close_content(staff, report, ReportStatus::Dismissed, note).await
    }

    pub async fn list_question_reports(
        &self,
        staff: &User,
        status: Option<ReportStatus>,
        params: ListParams,
    ) -> ServiceResult<PagedResult<QuestionReport>> {
        require_staff(staff)?;
        let (reports, total) = self
            .reports
            .list_questions(status, &params)
            .await
            .context("Failed to list question reports")?;
        Ok(PagedResult::new(reports, total, &params))
    }

    /// Resolve or dismiss a question report
    pub async fn close_question_report(
        &self,
        staff: &User,
        id: i64,
        status: ReportStatus,
        note: Option<String>,
    ) -> ServiceResult<QuestionReport> {
        require_staff(staff)?;
        if status == ReportStatus::Pending {
            return Err(ServiceError::validation("A report cannot be reopened"));
        }
        let note = clean_details(note);
        let report = self
            .reports
            .get_question(id)
            .await
            .context("Failed to get question report")?
            .ok_or_else(|| ServiceError::not_found("Report"))?;
        if !self
            .reports
            .close_question(report.id, status, staff.id, note.as_deref())
            .await
            .context("Failed to close question report")?
        {
            return Err(ServiceError::validation("Only pending reports can be closed"));
        }
        tracing::info!(report_id = id, status = %status, by = staff.id, "Question report closed");
        self.reports
            .get_question(id)
            .await
            .context("Failed to get question report")?
            .ok_or_else(|| ServiceError::not_found("Report"))
    }

    async fn find_content(&self, id: i64) -> ServiceResult<ContentReport> {
        self.reports
            .get_content(id)
            .await
            .context("Failed to get report")?
            .ok_or_else(|| ServiceError::not_found("Report"))
    }

    async fn close_content(
        &self,
        staff: &User,
        report: ContentReport,
        status: ReportStatus,
        note: Option<String>,
    ) -> ServiceResult<ContentReport> {
        let note = clean_details(note);
        self.claim(staff, report.id, status, note.as_deref()).await?;
        tracing::info!(report_id = report.id, status = %status, by = staff.id, "Report closed");
        self.find_content(report.id).await
    }

    /// Move a pending report to `status`; fails if someone else got there first
    async fn claim(
        &self,
        staff: &User,
        id: i64,
        status: ReportStatus,
        note: Option<&str>,
    ) -> ServiceResult<()> {
        if self
            .reports
            .close_content(id, status, staff.id, note)
            .await
            .context("Failed to close report")?
        {
            Ok(())
        } else {
            Err(ServiceError::validation("Only pending reports can be closed"))
        }
    }

    async fn remove_target(&self, staff: &User, report: &ContentReport) -> ServiceResult<()> {
        match report.target_type {
            ReportTarget::Post => match self.posts.find(report.target_id).await {
                Ok(post) => self.posts.remove(&post).await,
                Err(ServiceError::NotFound(_)) => {
                    tracing::debug!(post_id = report.target_id, "Reported post already gone");
                    Ok(())
                }
                Err(e) => Err(e),
            },
            ReportTarget::Module => match self.modules.unpublish(report.target_id).await {
                Ok(()) | Err(ServiceError::NotFound(_)) => Ok(()),
                Err(e) => Err(e),
            },
            ReportTarget::User => self
                .accounts
                .set_banned(staff, report.target_id, true)
                .await
                .map(|_| ()),
        }
    }
}

fn require_staff(user: &User) -> ServiceResult<()> {
    if user.is_staff() {
        Ok(())
    } else {
        Err(ServiceError::forbidden("LGU privileges required"))
    }
}

/// Reports outside the caller's province and city look missing
fn check_scope(staff: &User, report: &ContentReport) -> ServiceResult<()> {
    let place = Location::new(report.province.as_str(), report.city.as_str(), "");
    if staff.scope().covers(&place) {
        Ok(())
    } else {
        Err(ServiceError::not_found("Report"))
    }
}

fn validate_reason(reason: &str) -> ServiceResult<String> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(ServiceError::validation("A reason is required"));
    }
    if reason.chars().count() > MAX_REASON_LENGTH {
        return Err(ServiceError::Validation(format!(
            "Reason must be at most {} characters",
            MAX_REASON_LENGTH
        )));
    }
    Ok(reason.to_string())
}

fn clean_details(details: Option<String>) -> Option<String> {
    details.map(|d| d.trim().to_string()).filter(|d| !d.is_empty())
}
