//! Quiz service
//!
//! Staff build quizzes (optionally attached to a module); citizens answer
//! them. Repeating a quiz is allowed, but only an improvement over the best
//! previous score earns points.

use crate::cache::{CacheLayer, SharedCache, LEADERBOARD_PATTERN};
use crate::db::repositories::{ModuleRepository, QuizRepository};
use crate::models::{
    grade, AttemptResult, CreateQuizInput, ListParams, PagedResult, QuestionInput, Quiz,
    QuizAttempt, QuizQuestion, QuizView, QuizWithQuestions, UpdateQuizInput, User,
};
use crate::services::error::{ServiceError, ServiceResult};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

const MAX_POINTS_PER_QUESTION: i64 = 100;
const MAX_QUESTIONS: usize = 50;

pub struct QuizService {
    quizzes: Arc<dyn QuizRepository>,
    modules: Arc<dyn ModuleRepository>,
    cache: SharedCache,
}

impl QuizService {
    pub fn new(quizzes: Arc<dyn QuizRepository>, modules: Arc<dyn ModuleRepository>, cache: SharedCache) -> Self {
        Self {
            quizzes,
            modules,
            cache,
        }
    }

    pub async fn create_quiz(&self, author: &User, input: CreateQuizInput) -> ServiceResult<QuizWithQuestions> {
        require_staff(author)?;
        let title = validate_title(&input.title)?;
        validate_points(input.points_per_question)?;
        validate_questions(&input.questions, input.is_published)?;
        self.check_module(input.module_id).await?;

        let now = Utc::now();
        let quiz = Quiz {
            id: 0,
            module_id: input.module_id,
            title,
            description: input.description.trim().to_string(),
            points_per_question: input.points_per_question,
            is_published: input.is_published,
            created_by: Some(author.id),
            created_at: now,
            updated_at: now,
        };
        let created = self
            .quizzes
            .create(&quiz, &input.questions)
            .await
            .context("Failed to create quiz")?;
        tracing::info!(quiz_id = created.quiz.id, questions = created.questions.len(), "Quiz created");
        Ok(created)
    }

    /// Full quiz including answers; staff only
    pub async fn get_quiz_with_answers(&self, viewer: &User, id: i64) -> ServiceResult<QuizWithQuestions> {
        require_staff(viewer)?;
        self.find_full(id).await
    }

    /// Quiz without answers. Drafts are hidden from citizens.
    pub async fn get_quiz(&self, viewer: &User, id: i64) -> ServiceResult<QuizView> {
        let full = self.find_full(id).await?;
        if !full.quiz.is_published && !viewer.is_staff() {
            return Err(ServiceError::not_found("Quiz"));
        }
        Ok(full.into())
    }

    pub async fn list_quizzes(
        &self,
        viewer: &User,
        module_id: Option<i64>,
        params: ListParams,
    ) -> ServiceResult<PagedResult<Quiz>> {
        let (quizzes, total) = self
            .quizzes
            .list(viewer.is_staff(), module_id, &params)
            .await
            .context("Failed to list quizzes")?;
        Ok(PagedResult::new(quizzes, total, &params))
    }

    /// Creator or super admin; `questions` replaces the whole list
    pub async fn update_quiz(&self, editor: &User, id: i64, input: UpdateQuizInput) -> ServiceResult<QuizWithQuestions> {
        require_staff(editor)?;
        let current = self.find_full(id).await?;
        check_owner(&current.quiz, editor)?;

        let mut quiz = current.quiz;
        if let Some(title) = input.title {
            quiz.title = validate_title(&title)?;
        }
        if let Some(description) = input.description {
            quiz.description = description.trim().to_string();
        }
        if let Some(points) = input.points_per_question {
            validate_points(points)?;
            quiz.points_per_question = points;
        }
        if let Some(module_id) = input.module_id {
            self.check_module(Some(module_id)).await?;
            quiz.module_id = Some(module_id);
        }
        if let Some(published) = input.is_published {
            quiz.is_published = published;
        }

        match &input.questions {
            Some(questions) => validate_questions(questions, quiz.is_published)?,
            None if quiz.is_published && current.questions.is_empty() => {
                return Err(ServiceError::validation(
                    "A published quiz needs at least one question",
                ))
            }
            None => {}
        }
        quiz.updated_at = Utc::now();

        let updated = self
            .quizzes
            .update(&quiz, input.questions.as_deref())
            .await
            .context("Failed to update quiz")?;
        Ok(updated)
    }

    pub async fn delete_quiz(&self, editor: &User, id: i64) -> ServiceResult<()> {
        require_staff(editor)?;
        let quiz = self.find(id).await?;
        check_owner(&quiz, editor)?;
        self.quizzes.delete(id).await.context("Failed to delete quiz")?;
        tracing::info!(quiz_id = id, by = editor.id, "Quiz deleted");
        Ok(())
    }

    /// Grade a full set of answers, one per question in order
    pub async fn submit_attempt(&self, user: &User, quiz_id: i64, answers: &[i64]) -> ServiceResult<AttemptResult> {
        let full = self.find_full(quiz_id).await?;
        if !full.quiz.is_published {
            return Err(ServiceError::not_found("Quiz"));
        }
        if full.questions.is_empty() {
            return Err(ServiceError::validation("This quiz has no questions"));
        }
        if answers.len() != full.questions.len() {
            return Err(ServiceError::Validation(format!(
                "Expected {} answers, got {}",
                full.questions.len(),
                answers.len()
            )));
        }
        if let Some((position, _)) = full
            .questions
            .iter()
            .zip(answers)
            .enumerate()
            .find(|(_, (q, a))| **a < 0 || **a as usize >= q.choices.len())
        {
            return Err(ServiceError::Validation(format!(
                "Answer {} is not one of the choices",
                position + 1
            )));
        }

        let (score, results) = grade(&full.questions, answers);
        let total = full.questions.len() as i64;
        let (attempt, previous_best) = self
            .quizzes
            .record_attempt(&full.quiz, user.id, answers, score, total)
            .await
            .context("Failed to record attempt")?;

        tracing::info!(
            quiz_id,
            user_id = user.id,
            score,
            total,
            points = attempt.points_awarded,
            "Quiz attempt graded"
        );
        if attempt.points_awarded > 0 {
            if let Err(e) = self.cache.delete_pattern(LEADERBOARD_PATTERN).await {
                tracing::warn!(error = %e, "Failed to invalidate leaderboard cache");
            }
        }

        Ok(AttemptResult {
            attempt,
            previous_best,
            results,
        })
    }

    pub async fn list_my_attempts(&self, user: &User, quiz_id: Option<i64>) -> ServiceResult<Vec<QuizAttempt>> {
        let attempts = self
            .quizzes
            .list_attempts(user.id, quiz_id)
            .await
            .context("Failed to list attempts")?;
        Ok(attempts)
    }

    pub(crate) async fn find_question(&self, id: i64) -> ServiceResult<QuizQuestion> {
        self.quizzes
            .get_question(id)
            .await
            .context("Failed to get question")?
            .ok_or_else(|| ServiceError::not_found("Question"))
    }

    async fn find(&self, id: i64) -> ServiceResult<Quiz> {
        self.quizzes
            .get_by_id(id)
            .await
            .context("Failed to get quiz")?
            .ok_or_else(|| ServiceError::not_found("Quiz"))
    }

    async fn find_full(&self, id: i64) -> ServiceResult<QuizWithQuestions> {
        self.quizzes
            .get_with_questions(id)
            .await
            .context("Failed to get quiz")?
            .ok_or_else(|| ServiceError::not_found("Quiz"))
    }

    async fn check_module(&self, module_id: Option<i64>) -> ServiceResult<()> {
        if let Some(id) = module_id {
            if self
                .modules
                .get_by_id(id)
                .await
                .context("Failed to get module")?
                .is_none()
            {
                return Err(ServiceError::validation("Linked module does not exist"));
            }
        }
        Ok(())
    }
}

fn require_staff(user: &User) -> ServiceResult<()> {
    if user.is_staff() {
        Ok(())
    } else {
        Err(ServiceError::forbidden("LGU privileges required"))
    }
}

fn check_owner(quiz: &Quiz, editor: &User) -> ServiceResult<()> {
    if editor.is_super_admin() || quiz.created_by == Some(editor.id) {
        Ok(())
    } else {
        Err(ServiceError::forbidden("Only the author can change this quiz"))
    }
}

fn validate_title(title: &str) -> ServiceResult<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ServiceError::validation("Title cannot be empty"));
    }
    Ok(title.to_string())
}

fn validate_points(points: i64) -> ServiceResult<()> {
    if !(0..=MAX_POINTS_PER_QUESTION).contains(&points) {
        return Err(ServiceError::Validation(format!(
            "points_per_question must be between 0 and {}",
            MAX_POINTS_PER_QUESTION
        )));
    }
    Ok(())
}

fn validate_questions(questions: &[QuestionInput], published: bool) -> ServiceResult<()> {
    if published && questions.is_empty() {
        return Err(ServiceError::validation(
            "A published quiz needs at least one question",
        ));
    }
    if questions.len() > MAX_QUESTIONS {
        return Err(ServiceError::Validation(format!(
            "A quiz can have at most {} questions",
            MAX_QUESTIONS
        )));
    }
    for (i, question) in questions.iter().enumerate() {
        if let Some(problem) = question.problem() {
            return Err(ServiceError::Validation(format!("Question {}: {}", i + 1, problem)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::repositories::{SqlxModuleRepository, SqlxQuizRepository, SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Location, UserRole};

    struct Harness {
        users: Arc<dyn UserRepository>,
        service: QuizService,
    }

    async fn setup() -> Harness {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.unwrap();
        Harness {
            users: SqlxUserRepository::boxed(pool.clone()),
            service: QuizService::new(
                SqlxQuizRepository::boxed(pool.clone()),
                SqlxModuleRepository::boxed(pool),
                Arc::new(MemoryCache::new()),
            ),
        }
    }

    async fn user(h: &Harness, email: &str, role: UserRole) -> User {
        h.users
            .create(&User::new(
                email.to_string(),
                email.to_string(),
                "hash".to_string(),
                role,
                Location::new("Bohol", "Tagbilaran", ""),
            ))
            .await
            .unwrap()
    }

    fn question(prompt: &str, correct: i64) -> QuestionInput {
        QuestionInput {
            prompt: prompt.to_string(),
            choices: vec!["Run outside".into(), "Drop, cover, hold".into(), "Use the elevator".into()],
            correct_index: correct,
            explanation: "Protect your head".to_string(),
        }
    }

    fn quiz_input(published: bool, questions: Vec<QuestionInput>) -> CreateQuizInput {
        CreateQuizInput {
            module_id: None,
            title: "Earthquake quiz".to_string(),
            description: String::new(),
            points_per_question: 5,
            is_published: published,
            questions,
        }
    }

    #[tokio::test]
    async fn test_create_validates_questions() {
        let h = setup().await;
        let lgu = user(&h, "lgu@x.ph", UserRole::Lgu).await;

        let empty_published = h.service.create_quiz(&lgu, quiz_input(true, vec![])).await.unwrap_err();
        assert!(matches!(empty_published, ServiceError::Validation(_)));

        let mut bad = question("Q1", 1);
        bad.correct_index = 3;
        let err = h.service.create_quiz(&lgu, quiz_input(false, vec![bad])).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(msg) if msg.starts_with("Question 1")));

        let mut linked = quiz_input(false, vec![]);
        linked.module_id = Some(42);
        assert!(matches!(h.service.create_quiz(&lgu, linked).await, Err(ServiceError::Validation(_))));

        let draft = h.service.create_quiz(&lgu, quiz_input(false, vec![])).await.unwrap();
        assert!(draft.questions.is_empty());
    }

    #[tokio::test]
    async fn test_citizen_view_hides_answers_and_drafts() {
        let h = setup().await;
        let lgu = user(&h, "lgu@x.ph", UserRole::Lgu).await;
        let citizen = user(&h, "c@x.ph", UserRole::Citizen).await;

        let live = h.service.create_quiz(&lgu, quiz_input(true, vec![question("Q1", 1)])).await.unwrap();
        let draft = h.service.create_quiz(&lgu, quiz_input(false, vec![])).await.unwrap();

        let view = h.service.get_quiz(&citizen, live.quiz.id).await.unwrap();
        let json = serde_json::to_value(&view).unwrap();
        assert!(json["questions"][0].get("correct_index").is_none());

        assert!(matches!(h.service.get_quiz(&citizen, draft.quiz.id).await, Err(ServiceError::NotFound(_))));
        assert!(matches!(
            h.service.get_quiz_with_answers(&citizen, live.quiz.id).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert_eq!(h.service.list_quizzes(&citizen, None, ListParams::default()).await.unwrap().total, 1);
        assert_eq!(h.service.list_quizzes(&lgu, None, ListParams::default()).await.unwrap().total, 2);
    }

    #[tokio::test]
    async fn test_attempts_only_pay_for_improvement() {
        let h = setup().await;
        let lgu = user(&h, "lgu@x.ph", UserRole::Lgu).await;
        let citizen = user(&h, "c@x.ph", UserRole::Citizen).await;
        let quiz = h
            .service
            .create_quiz(
                &lgu,
                quiz_input(true, vec![question("Q1", 1), question("Q2", 1), question("Q3", 0)]),
            )
            .await
            .unwrap();
        let id = quiz.quiz.id;

        let first = h.service.submit_attempt(&citizen, id, &[1, 0, 1]).await.unwrap();
        assert_eq!(first.attempt.score, 1);
        assert_eq!(first.attempt.points_awarded, 5);
        assert_eq!(first.previous_best, 0);
        assert!(first.results[0].correct);
        assert_eq!(first.results[1].explanation, "Protect your head");

        let worse = h.service.submit_attempt(&citizen, id, &[0, 0, 1]).await.unwrap();
        assert_eq!(worse.attempt.points_awarded, 0);

        let best = h.service.submit_attempt(&citizen, id, &[1, 1, 0]).await.unwrap();
        assert_eq!(best.attempt.score, 3);
        assert_eq!(best.previous_best, 1);
        assert_eq!(best.attempt.points_awarded, 10);

        assert_eq!(h.users.get_by_id(citizen.id).await.unwrap().unwrap().points, 15);
        let attempts = h.service.list_my_attempts(&citizen, Some(id)).await.unwrap();
        assert_eq!(attempts.len(), 3);
        assert_eq!(attempts[0].score, 3);
    }

    #[tokio::test]
    async fn test_attempt_answer_count_and_range() {
        let h = setup().await;
        let lgu = user(&h, "lgu@x.ph", UserRole::Lgu).await;
        let citizen = user(&h, "c@x.ph", UserRole::Citizen).await;
        let quiz = h
            .service
            .create_quiz(&lgu, quiz_input(true, vec![question("Q1", 1), question("Q2", 2)]))
            .await
            .unwrap();

        let short = h.service.submit_attempt(&citizen, quiz.quiz.id, &[1]).await.unwrap_err();
        assert!(matches!(short, ServiceError::Validation(_)));
        let out_of_range = h.service.submit_attempt(&citizen, quiz.quiz.id, &[1, 7]).await.unwrap_err();
        assert!(matches!(out_of_range, ServiceError::Validation(msg) if msg.contains("Answer 2")));
    }

    #[tokio::test]
    async fn test_update_replaces_questions_and_checks_owner() {
        let h = setup().await;
        let author = user(&h, "lgu@x.ph", UserRole::Lgu).await;
        let other = user(&h, "lgu2@x.ph", UserRole::Lgu).await;
        let quiz = h.service.create_quiz(&author, quiz_input(false, vec![])).await.unwrap();

        let publish_empty = UpdateQuizInput {
            is_published: Some(true),
            ..Default::default()
        };
        assert!(matches!(
            h.service.update_quiz(&author, quiz.quiz.id, publish_empty).await,
            Err(ServiceError::Validation(_))
        ));

        let publish = UpdateQuizInput {
            is_published: Some(true),
            questions: Some(vec![question("New", 0)]),
            ..Default::default()
        };
        assert!(matches!(
            h.service.update_quiz(&other, quiz.quiz.id, publish.clone()).await,
            Err(ServiceError::Forbidden(_))
        ));
        let updated = h.service.update_quiz(&author, quiz.quiz.id, publish).await.unwrap();
        assert!(updated.quiz.is_published);
        assert_eq!(updated.questions.len(), 1);
        assert_eq!(updated.questions[0].prompt, "New");

        h.service.delete_quiz(&author, quiz.quiz.id).await.unwrap();
        assert!(matches!(h.service.get_quiz(&author, quiz.quiz.id).await, Err(ServiceError::NotFound(_))));
    }
}
