// src/models/class.rs

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{
    quiz::QuizListItem,
    stats::{ClassPerformance, RecentAttempt},
    user::{User, UserSummary},
};

/// A teacher-owned group of students, joined through `code`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: i64,
    pub name: String,
    /// Join code. Unique across classes and never changed after creation.
    pub code: String,
    pub teacher_id: i64,
    #[serde(skip)]
    pub student_ids: Vec<i64>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Class {
    pub fn is_owner(&self, user: &User) -> bool {
        self.teacher_id == user.id
    }

    pub fn is_member(&self, user: &User) -> bool {
        self.student_ids.contains(&user.id)
    }

    /// Owning teacher or enrolled student.
    pub fn can_view(&self, user: &User) -> bool {
        self.is_owner(user) || self.is_member(user)
    }
}

/// Teacher reference embedded in class responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherRef {
    pub name: Option<String>,
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassCounts {
    pub students: usize,
    pub quizzes: usize,
}

/// Class as listed, created or joined.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassCard {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub teacher: TeacherRef,
    pub counts: ClassCounts,
}

impl ClassCard {
    pub fn new(class: &Class, teacher: &User, quizzes: usize) -> Self {
        Self {
            id: class.id,
            name: class.name.clone(),
            code: class.code.clone(),
            teacher: TeacherRef {
                name: teacher.name.clone(),
                email: teacher.email.clone(),
            },
            counts: ClassCounts {
                students: class.student_ids.len(),
                quizzes,
            },
        }
    }
}

/// DTO for creating a class.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateClassRequest {
    #[validate(length(min = 1, max = 100, message = "Please provide a valid class name"))]
    pub name: String,
}

/// DTO for joining a class by code.
#[derive(Debug, Deserialize, Validate)]
pub struct JoinClassRequest {
    #[validate(length(min = 1, max = 32, message = "Class code is required"))]
    pub code: String,
}

/// `GET /api/classes/{id}`: the class with its roster, quizzes and results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassDetail {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub teacher: TeacherRef,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub students: Vec<UserSummary>,
    pub quizzes: Vec<QuizListItem>,
    pub stats: ClassPerformance,
    pub recent_attempts: Vec<RecentAttempt>,
}
