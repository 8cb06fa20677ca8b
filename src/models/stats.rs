// src/models/stats.rs

//! Response shapes of the dashboards, leaderboard and analytics endpoints.
//! Everything here is produced by `crate::analytics`.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Score totals of a set of attempts. `average_score` is a rounded percentage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSummary {
    pub attempts: usize,
    pub total_score: i64,
    pub total_max_score: i64,
    pub average_score: i64,
}

/// An attempt as listed in activity feeds.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentAttempt {
    pub attempt_id: i64,
    pub user_id: i64,
    pub student_name: String,
    pub quiz_id: i64,
    pub quiz_title: String,
    pub class_id: i64,
    pub class_name: String,
    pub score: i32,
    pub max_score: i32,
    pub percentage: i64,
    pub created_at: DateTime<Utc>,
}

/// A single score without the student, for per-student lists.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreLine {
    pub quiz_id: i64,
    pub quiz_title: String,
    pub score: i32,
    pub max_score: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizStats {
    pub total_questions: usize,
    pub total_attempts: usize,
    pub average_score: i64,
    pub recent_attempt: Option<RecentAttempt>,
}

/// One row of `GET /api/quizzes`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherQuizItem {
    pub id: i64,
    pub title: String,
    pub class_id: i64,
    pub class_name: String,
    pub time_limit: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub stats: QuizStats,
}

/// Rollup of one class.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassPerformance {
    pub class_id: i64,
    pub class_name: String,
    pub total_students: usize,
    pub total_quizzes: usize,
    pub total_attempts: usize,
    pub average_score: i64,
}

/// A student's standing in one class.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentClassPerformance {
    pub class_id: i64,
    pub class_name: String,
    pub average_score: i64,
    pub completed_quizzes: usize,
    pub total_quizzes: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopPerformer {
    pub user_id: i64,
    pub student_name: String,
    /// The class shared with the teacher, or "Multiple Classes".
    pub class_name: String,
    pub average_score: i64,
    pub total_score: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherTotals {
    pub total_students: usize,
    pub total_classes: usize,
    pub total_quizzes: usize,
    pub average_score: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherDashboard {
    pub stats: TeacherTotals,
    pub recent_activity: Vec<RecentAttempt>,
    pub top_performers: Vec<TopPerformer>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentTotals {
    pub total_classes: usize,
    pub quizzes_completed: usize,
    pub average_score: i64,
    pub rank: usize,
    pub total_students_in_rank: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingQuiz {
    pub id: i64,
    pub class_id: i64,
    pub title: String,
    pub class_name: String,
    pub total_questions: usize,
    pub time_limit: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDashboard {
    pub stats: StudentTotals,
    pub recent_activity: Vec<RecentAttempt>,
    pub performance_by_class: Vec<StudentClassPerformance>,
    pub upcoming_quizzes: Vec<UpcomingQuiz>,
}

/// `GET /api/dashboard` answers with the shape matching the caller's role.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Dashboard {
    Teacher(TeacherDashboard),
    Student(StudentDashboard),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub total_students: usize,
    pub total_quizzes: usize,
    pub total_attempts: usize,
    pub average_score: i64,
    pub class_performance: Vec<ClassPerformance>,
    pub recent_scores: Vec<RecentAttempt>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub user_id: i64,
    pub student_name: String,
    pub total_score: i64,
    pub total_max_score: i64,
    pub average_score: i64,
    pub quizzes_taken: usize,
    pub recent_scores: Vec<ScoreLine>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRef {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentQuizStats {
    pub total_attempts: usize,
    pub average_score: i64,
    pub recent_score: Option<ScoreLine>,
}

/// One row of `GET /api/students`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentOverview {
    pub id: i64,
    pub name: Option<String>,
    pub email: String,
    pub enrolled_classes: Vec<ClassRef>,
    pub quiz_stats: StudentQuizStats,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDetailStats {
    pub total_attempts: usize,
    pub average_score: i64,
    pub best_score: i64,
    pub worst_score: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDetail {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub enrolled_classes: Vec<StudentClassPerformance>,
    pub quiz_attempts: Vec<RecentAttempt>,
    pub stats: StudentDetailStats,
}

/// A class member with their results in that class.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassStudent {
    pub id: i64,
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub attempts: usize,
    pub average_score: i64,
    pub scores: Vec<ScoreLine>,
}
