//! Report repository
//!
//! Content and question reports. A partial unique index allows only one
//! PENDING report per reporter and target, and status changes only ever
//! apply to rows that are still PENDING.

use crate::db::DynDatabasePool;
use crate::models::{
    ContentReport, CreateContentReportInput, CreateQuestionReportInput, ListParams, Location,
    QuestionReport, ReportStatus, ReportTarget,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

#[async_trait]
pub trait ReportRepository: Send + Sync {
    /// `place` is where the reported content's owner lives
    async fn create_content(
        &self,
        reporter_id: i64,
        input: &CreateContentReportInput,
        place: &Location,
    ) -> Result<ContentReport>;

    async fn get_content(&self, id: i64) -> Result<Option<ContentReport>>;

    /// Oldest first; `place` narrows to one (province, city) when given
    async fn list_content(
        &self,
        status: Option<ReportStatus>,
        place: Option<(&str, &str)>,
        params: &ListParams,
    ) -> Result<(Vec<ContentReport>, i64)>;

    /// Move a PENDING report to `status`. Returns false if it was not pending.
    async fn close_content(
        &self,
        id: i64,
        status: ReportStatus,
        resolved_by: i64,
        note: Option<&str>,
    ) -> Result<bool>;

    /// Put a report closed by `resolved_by` back to PENDING. Returns false
    /// if it is not in that state.
    async fn reopen_content(&self, id: i64, resolved_by: i64) -> Result<bool>;

    async fn create_question(
        &self,
        reporter_id: i64,
        quiz_id: i64,
        input: &CreateQuestionReportInput,
    ) -> Result<QuestionReport>;

    async fn get_question(&self, id: i64) -> Result<Option<QuestionReport>>;

    async fn list_questions(
        &self,
        status: Option<ReportStatus>,
        params: &ListParams,
    ) -> Result<(Vec<QuestionReport>, i64)>;

    async fn close_question(
        &self,
        id: i64,
        status: ReportStatus,
        resolved_by: i64,
        note: Option<&str>,
    ) -> Result<bool>;
}

pub struct SqlxReportRepository {
    pool: DynDatabasePool,
}

impl SqlxReportRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ReportRepository> {
        Arc::new(Self::new(pool))
    }
}

const CONTENT_COLUMNS: &str = "id, reporter_id, target_type, target_id, reason, details, status, province, city, \
     resolved_by, resolution_note, created_at, updated_at";

const QUESTION_COLUMNS: &str = "id, reporter_id, question_id, quiz_id, reason, details, status, \
     resolved_by, resolution_note, created_at, updated_at";

#[async_trait]
impl ReportRepository for SqlxReportRepository {
    async fn create_content(
        &self,
        reporter_id: i64,
        input: &CreateContentReportInput,
        place: &Location,
    ) -> Result<ContentReport> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO content_reports (reporter_id, target_type, target_id, reason, details,
                                         status, province, city, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 'PENDING', ?, ?, ?, ?)
            "#,
        )
        .bind(reporter_id)
        .bind(input.target_type.to_string())
        .bind(input.target_id)
        .bind(input.reason.trim())
        .bind(&input.details)
        .bind(place.province.trim())
        .bind(place.city.trim())
        .bind(now)
        .bind(now)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to create content report")?;

        get_content(self.pool.sqlite(), result.last_insert_rowid())
            .await?
            .context("Report missing after insert")
    }

    async fn get_content(&self, id: i64) -> Result<Option<ContentReport>> {
        get_content(self.pool.sqlite(), id).await
    }

    async fn list_content(
        &self,
        status: Option<ReportStatus>,
        place: Option<(&str, &str)>,
        params: &ListParams,
    ) -> Result<(Vec<ContentReport>, i64)> {
        let status = status.map(|s| s.to_string());
        let province = place.map(|(p, _)| p);
        let city = place.map(|(_, c)| c);
        let conditions = "(?1 IS NULL OR status = ?1) \
             AND (?2 IS NULL OR (province = ?2 COLLATE NOCASE AND city = ?3 COLLATE NOCASE))";

        let sql = format!(
            "SELECT {} FROM content_reports WHERE {} ORDER BY created_at, id LIMIT ?4 OFFSET ?5",
            CONTENT_COLUMNS, conditions
        );
        let rows = sqlx::query(&sql)
            .bind(&status)
            .bind(province)
            .bind(city)
            .bind(params.limit())
            .bind(params.offset())
            .fetch_all(self.pool.sqlite())
            .await
            .context("Failed to list content reports")?;

        let count_sql = format!("SELECT COUNT(*) as count FROM content_reports WHERE {}", conditions);
        let total: i64 = sqlx::query(&count_sql)
            .bind(&status)
            .bind(province)
            .bind(city)
            .fetch_one(self.pool.sqlite())
            .await
            .context("Failed to count content reports")?
            .get("count");

        let reports = rows.iter().map(row_to_content).collect::<Result<Vec<_>>>()?;
        Ok((reports, total))
    }

    async fn close_content(
        &self,
        id: i64,
        status: ReportStatus,
        resolved_by: i64,
        note: Option<&str>,
    ) -> Result<bool> {
        close(self.pool.sqlite(), "content_reports", id, status, resolved_by, note).await
    }

    async fn reopen_content(&self, id: i64, resolved_by: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE content_reports
            SET status = 'PENDING', resolved_by = NULL, resolution_note = NULL, updated_at = ?
            WHERE id = ? AND resolved_by = ? AND status != 'PENDING'
            "#,
        )
        .bind(Utc::now())
        .bind(id)
        .bind(resolved_by)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to reopen content report")?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_question(
        &self,
        reporter_id: i64,
        quiz_id: i64,
        input: &CreateQuestionReportInput,
    ) -> Result<QuestionReport> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO question_reports (reporter_id, question_id, quiz_id, reason, details,
                                          status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 'PENDING', ?, ?)
            "#,
        )
        .bind(reporter_id)
        .bind(input.question_id)
        .bind(quiz_id)
        .bind(input.reason.trim())
        .bind(&input.details)
        .bind(now)
        .bind(now)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to create question report")?;

        get_question(self.pool.sqlite(), result.last_insert_rowid())
            .await?
            .context("Report missing after insert")
    }

    async fn get_question(&self, id: i64) -> Result<Option<QuestionReport>> {
        get_question(self.pool.sqlite(), id).await
    }

    async fn list_questions(
        &self,
        status: Option<ReportStatus>,
        params: &ListParams,
    ) -> Result<(Vec<QuestionReport>, i64)> {
        let status = status.map(|s| s.to_string());

        let sql = format!(
            "SELECT {} FROM question_reports WHERE (?1 IS NULL OR status = ?1)
             ORDER BY created_at, id LIMIT ?2 OFFSET ?3",
            QUESTION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(&status)
            .bind(params.limit())
            .bind(params.offset())
            .fetch_all(self.pool.sqlite())
            .await
            .context("Failed to list question reports")?;

        let total: i64 = sqlx::query(
            "SELECT COUNT(*) as count FROM question_reports WHERE (?1 IS NULL OR status = ?1)",
        )
        .bind(&status)
        .fetch_one(self.pool.sqlite())
        .await
        .context("Failed to count question reports")?
        .get("count");

        let reports = rows.iter().map(row_to_question).collect::<Result<Vec<_>>>()?;
        Ok((reports, total))
    }

    async fn close_question(
        &self,
        id: i64,
        status: ReportStatus,
        resolved_by: i64,
        note: Option<&str>,
    ) -> Result<bool> {
        close(self.pool.sqlite(), "question_reports", id, status, resolved_by, note).await
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn get_content(pool: &SqlitePool, id: i64) -> Result<Option<ContentReport>> {
    let sql = format!("SELECT {} FROM content_reports WHERE id = ?", CONTENT_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get content report")?;
    row.as_ref().map(row_to_content).transpose()
}

async fn get_question(pool: &SqlitePool, id: i64) -> Result<Option<QuestionReport>> {
    let sql = format!("SELECT {} FROM question_reports WHERE id = ?", QUESTION_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get question report")?;
    row.as_ref().map(row_to_question).transpose()
}

/// `table` is always one of the two report tables named in this module
async fn close(
    pool: &SqlitePool,
    table: &'static str,
    id: i64,
    status: ReportStatus,
    resolved_by: i64,
    note: Option<&str>,
) -> Result<bool> {
    let sql = format!(
        "UPDATE {} SET status = ?, resolved_by = ?, resolution_note = ?, updated_at = ?
         WHERE id = ? AND status = 'PENDING'",
        table
    );
    let result = sqlx::query(&sql)
        .bind(status.to_string())
        .bind(resolved_by)
        .bind(note)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to update {}", table))?;
    Ok(result.rows_affected() > 0)
}

fn row_to_content(row: &sqlx::sqlite::SqliteRow) -> Result<ContentReport> {
    let target: String = row.get("target_type");
    let status: String = row.get("status");
    Ok(ContentReport {
        id: row.get("id"),
        reporter_id: row.get("reporter_id"),
        target_type: ReportTarget::from_str(&target)?,
        target_id: row.get("target_id"),
        reason: row.get("reason"),
        details: row.get("details"),
        status: ReportStatus::from_str(&status)?,
        province: row.get("province"),
        city: row.get("city"),
        resolved_by: row.get("resolved_by"),
        resolution_note: row.get("resolution_note"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_question(row: &sqlx::sqlite::SqliteRow) -> Result<QuestionReport> {
    let status: String = row.get("status");
    Ok(QuestionReport {
        id: row.get("id"),
        reporter_id: row.get("reporter_id"),
        question_id: row.get("question_id"),
        quiz_id: row.get("quiz_id"),
        reason: row.get("reason"),
        details: row.get("details"),
        status: ReportStatus::from_str(&status)?,
        resolved_by: row.get("resolved_by"),
        resolution_note: row.get("resolution_note"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup() -> (DynDatabasePool, SqlxReportRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.unwrap();
        sqlx::query("INSERT INTO users (name, email, password_hash) VALUES ('a', 'a@x.ph', 'h'), ('b', 'b@x.ph', 'h')")
            .execute(pool.sqlite())
            .await
            .unwrap();
        (pool.clone(), SqlxReportRepository::new(pool))
    }

    fn naga() -> Location {
        Location::new("Camarines Sur", "Naga", "")
    }

    fn post_report(target_id: i64) -> CreateContentReportInput {
        CreateContentReportInput {
            target_type: ReportTarget::Post,
            target_id,
            reason: "misleading".to_string(),
            details: None,
        }
    }

    #[tokio::test]
    async fn test_one_pending_report_per_target() {
        let (_pool, repo) = setup().await;
        let first = repo.create_content(1, &post_report(5), &naga()).await.unwrap();
        assert_eq!(first.status, ReportStatus::Pending);

        let err = repo.create_content(1, &post_report(5), &naga()).await.unwrap_err();
        assert!(crate::db::is_unique_violation(&err));

        // another reporter may report the same post
        repo.create_content(2, &post_report(5), &naga()).await.unwrap();

        // once closed, the same reporter may report again
        assert!(repo.close_content(first.id, ReportStatus::Dismissed, 2, None).await.unwrap());
        repo.create_content(1, &post_report(5), &naga()).await.unwrap();
    }

    #[tokio::test]
    async fn test_close_only_pending() {
        let (_pool, repo) = setup().await;
        let report = repo.create_content(1, &post_report(5), &naga()).await.unwrap();

        assert!(repo
            .close_content(report.id, ReportStatus::Resolved, 2, Some("removed"))
            .await
            .unwrap());
        assert!(!repo
            .close_content(report.id, ReportStatus::Dismissed, 2, None)
            .await
            .unwrap());

        let stored = repo.get_content(report.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReportStatus::Resolved);
        assert_eq!(stored.resolved_by, Some(2));
        assert_eq!(stored.resolution_note.as_deref(), Some("removed"));
    }

    #[tokio::test]
    async fn test_reopen_only_by_closer() {
        let (_pool, repo) = setup().await;
        let report = repo.create_content(1, &post_report(5), &naga()).await.unwrap();
        assert!(!repo.reopen_content(report.id, 2).await.unwrap());

        repo.close_content(report.id, ReportStatus::Resolved, 2, Some("removed"))
            .await
            .unwrap();
        assert!(!repo.reopen_content(report.id, 1).await.unwrap());
        assert!(repo.reopen_content(report.id, 2).await.unwrap());

        let stored = repo.get_content(report.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReportStatus::Pending);
        assert_eq!(stored.resolved_by, None);
    }

    #[tokio::test]
    async fn test_list_content_by_status_and_city() {
        let (_pool, repo) = setup().await;
        repo.create_content(1, &post_report(1), &naga()).await.unwrap();
        repo.create_content(1, &post_report(2), &Location::new("Camarines Sur", "Iriga", "")).await.unwrap();
        let closed = repo.create_content(1, &post_report(3), &naga()).await.unwrap();
        repo.close_content(closed.id, ReportStatus::Dismissed, 2, None)
            .await
            .unwrap();

        let params = ListParams::default();
        let (_, pending) = repo
            .list_content(Some(ReportStatus::Pending), None, &params)
            .await
            .unwrap();
        assert_eq!(pending, 2);

        let (naga, total) = repo
            .list_content(Some(ReportStatus::Pending), Some(("camarines sur", "naga")), &params)
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(naga[0].target_id, 1);

        let (_, all) = repo.list_content(None, None, &params).await.unwrap();
        assert_eq!(all, 3);
    }

    #[tokio::test]
    async fn test_list_content_matches_province_too() {
        let (_pool, repo) = setup().await;
        let mindoro = Location::new("Occidental Mindoro", "San Jose", "");
        repo.create_content(1, &post_report(1), &mindoro).await.unwrap();

        let params = ListParams::default();
        let (_, elsewhere) = repo
            .list_content(None, Some(("Nueva Ecija", "San Jose")), &params)
            .await
            .unwrap();
        assert_eq!(elsewhere, 0);

        let (reports, local) = repo
            .list_content(None, Some(("occidental mindoro", "san jose")), &params)
            .await
            .unwrap();
        assert_eq!(local, 1);
        assert_eq!(reports[0].province, "Occidental Mindoro");
    }

    #[tokio::test]
    async fn test_question_reports() {
        let (pool, repo) = setup().await;
        sqlx::query("INSERT INTO quizzes (title) VALUES ('q')")
            .execute(pool.sqlite())
            .await
            .unwrap();
        sqlx::query("INSERT INTO quiz_questions (quiz_id, prompt, choices, correct_index) VALUES (1, 'p', '[\"a\",\"b\"]', 0)")
            .execute(pool.sqlite())
            .await
            .unwrap();

        let input = CreateQuestionReportInput {
            question_id: 1,
            reason: "wrong answer key".to_string(),
            details: Some("B is right".to_string()),
        };
        let report = repo.create_question(1, 1, &input).await.unwrap();
        assert_eq!(report.quiz_id, 1);
        assert!(repo.create_question(1, 1, &input).await.is_err());

        assert!(repo
            .close_question(report.id, ReportStatus::Resolved, 2, None)
            .await
            .unwrap());
        let (_, pending) = repo
            .list_questions(Some(ReportStatus::Pending), &ListParams::default())
            .await
            .unwrap();
        assert_eq!(pending, 0);
    }
}
