//! Quiz, question and attempt models
//!
//! Staff see questions with their answers; citizens receive `QuizView`
//! which leaves out `correct_index` and explanations until they submit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,
    pub module_id: Option<i64>,
    pub title: String,
    pub description: String,
    pub points_per_question: i64,
    pub is_published: bool,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizQuestion {
    pub id: i64,
    pub quiz_id: i64,
    pub position: i64,
    pub prompt: String,
    pub choices: Vec<String>,
    pub correct_index: i64,
    pub explanation: String,
}

/// Quiz with its full question list (staff view)
#[derive(Debug, Clone, Serialize)]
pub struct QuizWithQuestions {
    #[serde(flatten)]
    pub quiz: Quiz,
    pub questions: Vec<QuizQuestion>,
}

/// Quiz as shown to a citizen before answering
#[derive(Debug, Clone, Serialize)]
pub struct QuizView {
    #[serde(flatten)]
    pub quiz: Quiz,
    pub questions: Vec<QuestionView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionView {
    pub id: i64,
    pub position: i64,
    pub prompt: String,
    pub choices: Vec<String>,
}

impl From<QuizWithQuestions> for QuizView {
    fn from(full: QuizWithQuestions) -> Self {
        Self {
            quiz: full.quiz,
            questions: full
                .questions
                .into_iter()
                .map(|q| QuestionView {
                    id: q.id,
                    position: q.position,
                    prompt: q.prompt,
                    choices: q.choices,
                })
                .collect(),
        }
    }
}

/// One question in a create/update request
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionInput {
    pub prompt: String,
    pub choices: Vec<String>,
    pub correct_index: i64,
    #[serde(default)]
    pub explanation: String,
}

impl QuestionInput {
    /// Reason the question is unusable, if any
    pub fn problem(&self) -> Option<&'static str> {
        if self.prompt.trim().is_empty() {
            return Some("Question prompt cannot be empty");
        }
        if self.choices.len() < 2 {
            return Some("Each question needs at least two choices");
        }
        if self.choices.iter().any(|c| c.trim().is_empty()) {
            return Some("Choices cannot be empty");
        }
        if self.correct_index < 0 || self.correct_index as usize >= self.choices.len() {
            return Some("correct_index does not point at a choice");
        }
        None
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateQuizInput {
    pub module_id: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_points_per_question")]
    pub points_per_question: i64,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default)]
    pub questions: Vec<QuestionInput>,
}

fn default_points_per_question() -> i64 {
    5
}

/// Update request; `questions`, when present, replaces the whole list
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateQuizInput {
    pub module_id: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub points_per_question: Option<i64>,
    pub is_published: Option<bool>,
    pub questions: Option<Vec<QuestionInput>>,
}

/// A stored attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizAttempt {
    pub id: i64,
    pub quiz_id: i64,
    pub user_id: i64,
    pub answers: Vec<i64>,
    pub score: i64,
    pub total: i64,
    pub points_awarded: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct QuestionResult {
    pub question_id: i64,
    pub selected_index: i64,
    pub correct_index: i64,
    pub correct: bool,
    pub explanation: String,
}

/// Response to a submitted attempt
#[derive(Debug, Clone, Serialize)]
pub struct AttemptResult {
    pub attempt: QuizAttempt,
    /// Best score before this attempt
    pub previous_best: i64,
    pub results: Vec<QuestionResult>,
}

/// Grade answers against questions in order.
///
/// Callers must check that both slices have the same length.
pub fn grade(questions: &[QuizQuestion], answers: &[i64]) -> (i64, Vec<QuestionResult>) {
    let results: Vec<QuestionResult> = questions
        .iter()
        .zip(answers)
        .map(|(q, &selected)| QuestionResult {
            question_id: q.id,
            selected_index: selected,
            correct_index: q.correct_index,
            correct: selected == q.correct_index,
            explanation: q.explanation.clone(),
        })
        .collect();
    let score = results.iter().filter(|r| r.correct).count() as i64;
    (score, results)
}

/// Points for an attempt: only improvement over the best previous score pays.
pub fn improvement_points(score: i64, previous_best: i64, points_per_question: i64) -> i64 {
    (score - previous_best).max(0) * points_per_question
}
