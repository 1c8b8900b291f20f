//! Quiz repository
//!
//! Quizzes, their ordered questions, and graded attempts.

use crate::db::DynDatabasePool;
use crate::models::{improvement_points, ListParams, QuestionInput, Quiz, QuizAttempt, QuizQuestion, QuizWithQuestions};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::sync::Arc;

#[async_trait]
pub trait QuizRepository: Send + Sync {
    /// Insert a quiz and its questions
    async fn create(&self, quiz: &Quiz, questions: &[QuestionInput]) -> Result<QuizWithQuestions>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Quiz>>;

    async fn get_with_questions(&self, id: i64) -> Result<Option<QuizWithQuestions>>;

    /// Newest first; optional module filter
    async fn list(
        &self,
        include_drafts: bool,
        module_id: Option<i64>,
        params: &ListParams,
    ) -> Result<(Vec<Quiz>, i64)>;

    /// Update quiz fields; `questions`, when given, replaces the whole list
    async fn update(&self, quiz: &Quiz, questions: Option<&[QuestionInput]>) -> Result<QuizWithQuestions>;

    async fn delete(&self, id: i64) -> Result<bool>;

    async fn get_question(&self, id: i64) -> Result<Option<QuizQuestion>>;

    /// Store a graded attempt and award improvement points.
    ///
    /// Returns the stored attempt and the best score before it.
    async fn record_attempt(
        &self,
        quiz: &Quiz,
        user_id: i64,
        answers: &[i64],
        score: i64,
        total: i64,
    ) -> Result<(QuizAttempt, i64)>;

    /// A user's attempts, newest first
    async fn list_attempts(&self, user_id: i64, quiz_id: Option<i64>) -> Result<Vec<QuizAttempt>>;
}

pub struct SqlxQuizRepository {
    pool: DynDatabasePool,
}

impl SqlxQuizRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn QuizRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl QuizRepository for SqlxQuizRepository {
    async fn create(&self, quiz: &Quiz, questions: &[QuestionInput]) -> Result<QuizWithQuestions> {
        let pool = self.pool.sqlite();
        let now = Utc::now();
        let mut tx = pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO quizzes (module_id, title, description, points_per_question, is_published,
                                 created_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(quiz.module_id)
        .bind(&quiz.title)
        .bind(&quiz.description)
        .bind(quiz.points_per_question)
        .bind(quiz.is_published)
        .bind(quiz.created_by)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create quiz")?;
        let id = result.last_insert_rowid();

        insert_questions(&mut tx, id, questions).await?;
        tx.commit().await.context("Failed to commit quiz")?;

        get_with_questions(pool, id)
            .await?
            .context("Quiz missing after insert")
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Quiz>> {
        get_quiz_by_id(self.pool.sqlite(), id).await
    }

    async fn get_with_questions(&self, id: i64) -> Result<Option<QuizWithQuestions>> {
        get_with_questions(self.pool.sqlite(), id).await
    }

    async fn list(
        &self,
        include_drafts: bool,
        module_id: Option<i64>,
        params: &ListParams,
    ) -> Result<(Vec<Quiz>, i64)> {
        let conditions = "(?1 OR is_published = 1) AND (?2 IS NULL OR module_id = ?2)";
        let sql = format!(
            "SELECT id, module_id, title, description, points_per_question, is_published,
                    created_by, created_at, updated_at
             FROM quizzes WHERE {} ORDER BY created_at DESC, id DESC LIMIT ?3 OFFSET ?4",
            conditions
        );
        let rows = sqlx::query(&sql)
            .bind(include_drafts)
            .bind(module_id)
            .bind(params.limit())
            .bind(params.offset())
            .fetch_all(self.pool.sqlite())
            .await
            .context("Failed to list quizzes")?;

        let count_sql = format!("SELECT COUNT(*) as count FROM quizzes WHERE {}", conditions);
        let total: i64 = sqlx::query(&count_sql)
            .bind(include_drafts)
            .bind(module_id)
            .fetch_one(self.pool.sqlite())
            .await
            .context("Failed to count quizzes")?
            .get("count");

        Ok((rows.iter().map(row_to_quiz).collect(), total))
    }

    async fn update(&self, quiz: &Quiz, questions: Option<&[QuestionInput]>) -> Result<QuizWithQuestions> {
        let pool = self.pool.sqlite();
        let mut tx = pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE quizzes
            SET module_id = ?, title = ?, description = ?, points_per_question = ?,
                is_published = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(quiz.module_id)
        .bind(&quiz.title)
        .bind(&quiz.description)
        .bind(quiz.points_per_question)
        .bind(quiz.is_published)
        .bind(Utc::now())
        .bind(quiz.id)
        .execute(&mut *tx)
        .await
        .context("Failed to update quiz")?;

        if let Some(questions) = questions {
            sqlx::query("DELETE FROM quiz_questions WHERE quiz_id = ?")
                .bind(quiz.id)
                .execute(&mut *tx)
                .await
                .context("Failed to clear quiz questions")?;
            insert_questions(&mut tx, quiz.id, questions).await?;
        }

        tx.commit().await.context("Failed to commit quiz update")?;

        get_with_questions(pool, quiz.id)
            .await?
            .context("Quiz not found after update")
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM quizzes WHERE id = ?")
            .bind(id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to delete quiz")?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_question(&self, id: i64) -> Result<Option<QuizQuestion>> {
        let row = sqlx::query(
            "SELECT id, quiz_id, position, prompt, choices, correct_index, explanation
             FROM quiz_questions WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool.sqlite())
        .await
        .context("Failed to get question")?;

        row.as_ref().map(row_to_question).transpose()
    }

    async fn record_attempt(
        &self,
        quiz: &Quiz,
        user_id: i64,
        answers: &[i64],
        score: i64,
        total: i64,
    ) -> Result<(QuizAttempt, i64)> {
        record_attempt(self.pool.sqlite(), quiz, user_id, answers, score, total).await
    }

    async fn list_attempts(&self, user_id: i64, quiz_id: Option<i64>) -> Result<Vec<QuizAttempt>> {
        let rows = sqlx::query(
            "SELECT id, quiz_id, user_id, answers, score, total, points_awarded, created_at
             FROM quiz_attempts
             WHERE user_id = ?1 AND (?2 IS NULL OR quiz_id = ?2)
             ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .bind(quiz_id)
        .fetch_all(self.pool.sqlite())
        .await
        .context("Failed to list attempts")?;

        rows.iter().map(row_to_attempt).collect()
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn insert_questions(
    tx: &mut Transaction<'_, Sqlite>,
    quiz_id: i64,
    questions: &[QuestionInput],
) -> Result<()> {
    for (position, question) in questions.iter().enumerate() {
        sqlx::query(
            "INSERT INTO quiz_questions (quiz_id, position, prompt, choices, correct_index, explanation)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(quiz_id)
        .bind(position as i64)
        .bind(question.prompt.trim())
        .bind(serde_json::to_string(&question.choices)?)
        .bind(question.correct_index)
        .bind(&question.explanation)
        .execute(&mut **tx)
        .await
        .context("Failed to insert quiz question")?;
    }
    Ok(())
}

async fn get_quiz_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Quiz>> {
    let row = sqlx::query(
        "SELECT id, module_id, title, description, points_per_question, is_published,
                created_by, created_at, updated_at
         FROM quizzes WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get quiz by ID")?;

    Ok(row.as_ref().map(row_to_quiz))
}

async fn get_with_questions(pool: &SqlitePool, id: i64) -> Result<Option<QuizWithQuestions>> {
    let Some(quiz) = get_quiz_by_id(pool, id).await? else {
        return Ok(None);
    };

    let rows = sqlx::query(
        "SELECT id, quiz_id, position, prompt, choices, correct_index, explanation
         FROM quiz_questions WHERE quiz_id = ? ORDER BY position, id",
    )
    .bind(id)
    .fetch_all(pool)
    .await
    .context("Failed to get quiz questions")?;

    let questions = rows.iter().map(row_to_question).collect::<Result<Vec<_>>>()?;
    Ok(Some(QuizWithQuestions { quiz, questions }))
}

async fn record_attempt(
    pool: &SqlitePool,
    quiz: &Quiz,
    user_id: i64,
    answers: &[i64],
    score: i64,
    total: i64,
) -> Result<(QuizAttempt, i64)> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        "INSERT INTO quiz_attempts (quiz_id, user_id, answers, score, total, points_awarded, created_at)
         VALUES (?, ?, ?, ?, ?, 0, ?)",
    )
    .bind(quiz.id)
    .bind(user_id)
    .bind(serde_json::to_string(answers)?)
    .bind(score)
    .bind(total)
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("Failed to record attempt")?;
    let id = result.last_insert_rowid();

    let previous_best: i64 = sqlx::query(
        "SELECT COALESCE(MAX(score), 0) as best FROM quiz_attempts
         WHERE quiz_id = ? AND user_id = ? AND id != ?",
    )
    .bind(quiz.id)
    .bind(user_id)
    .bind(id)
    .fetch_one(&mut *tx)
    .await
    .context("Failed to read best score")?
    .get("best");

    let points = improvement_points(score, previous_best, quiz.points_per_question);
    if points > 0 {
        sqlx::query("UPDATE quiz_attempts SET points_awarded = ? WHERE id = ?")
            .bind(points)
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to store attempt points")?;
        sqlx::query("UPDATE users SET points = points + ?, updated_at = ? WHERE id = ?")
            .bind(points)
            .bind(now)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("Failed to award quiz points")?;
    }

    tx.commit().await.context("Failed to commit attempt")?;

    let attempt = QuizAttempt {
        id,
        quiz_id: quiz.id,
        user_id,
        answers: answers.to_vec(),
        score,
        total,
        points_awarded: points,
        created_at: now,
    };
    Ok((attempt, previous_best))
}

fn row_to_quiz(row: &sqlx::sqlite::SqliteRow) -> Quiz {
    Quiz {
        id: row.get("id"),
        module_id: row.get("module_id"),
        title: row.get("title"),
        description: row.get("description"),
        points_per_question: row.get("points_per_question"),
        is_published: row.get("is_published"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_question(row: &sqlx::sqlite::SqliteRow) -> Result<QuizQuestion> {
    let choices: String = row.get("choices");
    Ok(QuizQuestion {
        id: row.get("id"),
        quiz_id: row.get("quiz_id"),
        position: row.get("position"),
        prompt: row.get("prompt"),
        choices: serde_json::from_str(&choices).context("Malformed question choices")?,
        correct_index: row.get("correct_index"),
        explanation: row.get("explanation"),
    })
}

fn row_to_attempt(row: &sqlx::sqlite::SqliteRow) -> Result<QuizAttempt> {
    let answers: String = row.get("answers");
    Ok(QuizAttempt {
        id: row.get("id"),
        quiz_id: row.get("quiz_id"),
        user_id: row.get("user_id"),
        answers: serde_json::from_str(&answers).context("Malformed attempt answers")?,
        score: row.get("score"),
        total: row.get("total"),
        points_awarded: row.get("points_awarded"),
        created_at: row.get("created_at"),
    })
}
