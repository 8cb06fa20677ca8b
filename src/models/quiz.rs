// src/models/quiz.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::question::{Question, QuestionInput, RedactedQuestion};

/// A quiz and its ordered questions.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub id: i64,
    pub class_id: i64,
    pub title: String,
    /// Minutes. `None` means untimed.
    pub time_limit: Option<i32>,
    pub questions: Vec<Question>,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle derived from the question list and the number of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuizStatus {
    Draft,
    Active,
    Attempted,
}

impl QuizStatus {
    pub fn of(quiz: &Quiz, attempts: usize) -> Self {
        if attempts > 0 {
            QuizStatus::Attempted
        } else if quiz.questions.is_empty() {
            QuizStatus::Draft
        } else {
            QuizStatus::Active
        }
    }

    /// Question sets are frozen once somebody has been graded against them.
    pub fn questions_editable(&self) -> bool {
        !matches!(self, QuizStatus::Attempted)
    }
}

/// DTO for creating a quiz.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuizRequest {
    #[validate(length(min = 1, max = 200, message = "Quiz title is required"))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 100, message = "A quiz can have at most 100 questions"))]
    pub questions: Vec<QuestionInput>,
    #[validate(range(min = 1, max = 600, message = "Time limit must be between 1 and 600 minutes"))]
    pub time_limit: Option<i32>,
}

/// DTO for replacing a quiz's questions.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuestionsRequest {
    #[validate(length(max = 100, message = "A quiz can have at most 100 questions"))]
    pub questions: Vec<QuestionInput>,
}

/// DTO for a student's submission. `null` entries are unanswered questions.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitQuizRequest {
    #[validate(length(max = 100))]
    pub answers: Vec<Option<String>>,
}

/// Teacher's view: everything, plus lifecycle and attempt count.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FullQuizView {
    pub id: i64,
    pub class_id: i64,
    pub title: String,
    pub time_limit: Option<i32>,
    pub status: QuizStatus,
    pub attempts: usize,
    pub questions: Vec<Question>,
    pub created_at: DateTime<Utc>,
}

/// Student's view before attempting: options only.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactedQuizView {
    pub id: i64,
    pub class_id: i64,
    pub title: String,
    pub time_limit: Option<i32>,
    pub questions: Vec<RedactedQuestion>,
    pub already_taken: bool,
    pub started_at: Option<DateTime<Utc>>,
}

/// Student's view after attempting: their answers next to the key.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewQuizView {
    pub id: i64,
    pub class_id: i64,
    pub title: String,
    pub time_limit: Option<i32>,
    pub questions: Vec<Question>,
    pub already_taken: bool,
    pub score: i32,
    pub max_score: i32,
    pub selected_answers: Vec<Option<String>>,
    pub correct_answers: Vec<String>,
    pub explanations: Vec<Option<String>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum QuizView {
    Full(FullQuizView),
    Redacted(RedactedQuizView),
    Review(ReviewQuizView),
}

/// One row of a class's quiz list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizListItem {
    pub id: i64,
    pub title: String,
    pub time_limit: Option<i32>,
    pub question_count: usize,
    pub attempt_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<QuizStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub already_taken: Option<bool>,
    pub created_at: DateTime<Utc>,
}

impl FullQuizView {
    pub fn new(quiz: Quiz, attempts: usize) -> Self {
        Self {
            status: QuizStatus::of(&quiz, attempts),
            attempts,
            id: quiz.id,
            class_id: quiz.class_id,
            title: quiz.title,
            time_limit: quiz.time_limit,
            questions: quiz.questions,
            created_at: quiz.created_at,
        }
    }
}

impl QuizListItem {
    /// Row for the owning teacher, with lifecycle status.
    pub fn for_owner(quiz: &Quiz, attempts: usize) -> Self {
        Self {
            id: quiz.id,
            title: quiz.title.clone(),
            time_limit: quiz.time_limit,
            question_count: quiz.questions.len(),
            attempt_count: attempts,
            status: Some(QuizStatus::of(quiz, attempts)),
            already_taken: None,
            created_at: quiz.created_at,
        }
    }

    /// Row for an enrolled student.
    pub fn for_student(quiz: &Quiz, attempts: usize, already_taken: bool) -> Self {
        Self {
            status: None,
            already_taken: Some(already_taken),
            ..Self::for_owner(quiz, attempts)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiz(questions: usize) -> Quiz {
        Quiz {
            id: 1,
            class_id: 1,
            title: "Q".to_string(),
            time_limit: None,
            questions: (0..questions)
                .map(|i| Question {
                    id: i as i64,
                    position: i as i32,
                    prompt: "p".to_string(),
                    options: vec!["A".to_string(), "B".to_string()],
                    correct_option: "A".to_string(),
                    explanation: None,
                })
                .collect(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn lifecycle_follows_questions_and_attempts() {
        assert_eq!(QuizStatus::of(&quiz(0), 0), QuizStatus::Draft);
        assert_eq!(QuizStatus::of(&quiz(2), 0), QuizStatus::Active);
        assert_eq!(QuizStatus::of(&quiz(2), 1), QuizStatus::Attempted);
        assert!(!QuizStatus::Attempted.questions_editable());
        assert!(QuizStatus::Draft.questions_editable());
    }

    #[test]
    fn redacted_view_has_no_answer_fields() {
        let q = quiz(2);
        let view = QuizView::Redacted(RedactedQuizView {
            id: q.id,
            class_id: q.class_id,
            title: q.title.clone(),
            time_limit: None,
            questions: q.questions.iter().map(RedactedQuestion::from).collect(),
            already_taken: false,
            started_at: None,
        });
        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("correctOption"));
        assert!(!json.contains("explanation"));
    }
}
