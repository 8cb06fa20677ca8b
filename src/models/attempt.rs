// src/models/attempt.rs

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::user::Role;

/// One graded submission. Never updated after insert.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub id: i64,
    pub user_id: i64,
    pub quiz_id: i64,
    pub score: i32,
    pub max_score: i32,
    pub answers: Vec<Option<String>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub user_id: i64,
    pub quiz_id: i64,
    pub score: i32,
    pub max_score: i32,
    pub answers: Vec<Option<String>>,
}

/// Attempt joined with the student, quiz and class it belongs to.
/// This is the input of every aggregation in `crate::analytics`.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub attempt_id: i64,
    pub user_id: i64,
    pub student_name: Option<String>,
    pub student_email: String,
    /// Current role of the account. Only students are ranked.
    pub student_role: Role,
    pub quiz_id: i64,
    pub quiz_title: String,
    pub class_id: i64,
    pub class_name: String,
    pub teacher_id: i64,
    pub score: i32,
    pub max_score: i32,
    pub created_at: DateTime<Utc>,
}

/// Narrows `Store::list_attempt_records`. Empty filter means every attempt.
#[derive(Debug, Clone, Default)]
pub struct AttemptFilter {
    pub user_id: Option<i64>,
    pub quiz_id: Option<i64>,
    pub class_id: Option<i64>,
    pub teacher_id: Option<i64>,
    pub since: Option<DateTime<Utc>>,
}

impl AttemptFilter {
    pub fn matches(&self, r: &AttemptRecord) -> bool {
        self.user_id.is_none_or(|id| r.user_id == id)
            && self.quiz_id.is_none_or(|id| r.quiz_id == id)
            && self.class_id.is_none_or(|id| r.class_id == id)
            && self.teacher_id.is_none_or(|id| r.teacher_id == id)
            && self.since.is_none_or(|t| r.created_at >= t)
    }
}

/// Response of a successful submission.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResult {
    pub attempt_id: i64,
    pub score: i32,
    pub max_score: i32,
    pub correct_answers: Vec<String>,
    pub explanations: Vec<Option<String>>,
}
