//! src/store/mod.rs
//!
//! Repository boundary. Handlers and aggregations only talk to `dyn Store`;
//! `PgStore` and `MemoryStore` are interchangeable behind it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    attempt::{Attempt, AttemptFilter, AttemptRecord, NewAttempt},
    class::Class,
    question::NewQuestion,
    quiz::Quiz,
    user::{NewUser, Role, User},
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A uniqueness rule was hit (email, join code, enrollment, attempt) or a
    /// write was refused because of existing dependent rows.
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Database error: {0}")]
    Database(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Shared handle used in `AppState`.
pub type DynStore = Arc<dyn Store>;

/// Partial update applied by administrators. `password` must already be hashed.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub role: Option<Role>,
    pub password: Option<String>,
}

#[async_trait]
pub trait Store: Send + Sync {
    // --- Users ---

    /// Fails with `Conflict` when the email is taken.
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;

    async fn find_user(&self, id: i64) -> StoreResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn list_users(&self) -> StoreResult<Vec<User>>;

    /// Users for the given ids, ordered by id. Unknown ids are skipped.
    async fn list_users_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<User>>;

    async fn count_users_with_role(&self, role: Role) -> StoreResult<usize>;

    async fn update_user(&self, id: i64, update: UserUpdate) -> StoreResult<User>;

    /// Removes the user with their memberships, attempts and owned classes.
    async fn delete_user(&self, id: i64) -> StoreResult<bool>;

    // --- Classes and enrollment ---

    /// Fails with `Conflict` when `code` is already used by another class.
    async fn create_class(&self, teacher_id: i64, name: &str, code: &str) -> StoreResult<Class>;

    async fn find_class(&self, id: i64) -> StoreResult<Option<Class>>;

    async fn find_class_by_code(&self, code: &str) -> StoreResult<Option<Class>>;

    async fn list_classes_by_teacher(&self, teacher_id: i64) -> StoreResult<Vec<Class>>;

    async fn list_classes_by_student(&self, student_id: i64) -> StoreResult<Vec<Class>>;

    /// Atomic membership insert. `Conflict` if the student is already enrolled.
    async fn add_student(&self, class_id: i64, student_id: i64) -> StoreResult<Class>;

    /// Deletes attempts, quiz starts, questions, quizzes, memberships and then
    /// the class, in that order and all-or-nothing.
    async fn delete_class(&self, id: i64) -> StoreResult<bool>;

    // --- Quizzes ---

    async fn create_quiz(
        &self,
        class_id: i64,
        title: &str,
        time_limit: Option<i32>,
        questions: Vec<NewQuestion>,
    ) -> StoreResult<Quiz>;

    async fn find_quiz(&self, id: i64) -> StoreResult<Option<Quiz>>;

    async fn list_quizzes_by_class(&self, class_id: i64) -> StoreResult<Vec<Quiz>>;

    async fn list_quizzes_by_teacher(&self, teacher_id: i64) -> StoreResult<Vec<Quiz>>;

    /// Replaces the whole question list and forgets every stamped start.
    /// `Conflict` once the quiz has attempts; the attempt check and the
    /// replacement are one atomic step.
    async fn replace_questions(&self, quiz_id: i64, questions: Vec<NewQuestion>)
    -> StoreResult<Quiz>;

    async fn delete_quiz(&self, id: i64) -> StoreResult<bool>;

    /// Returns the stored start for (user, quiz), inserting `at` if none exists.
    async fn record_quiz_start(
        &self,
        user_id: i64,
        quiz_id: i64,
        at: DateTime<Utc>,
    ) -> StoreResult<DateTime<Utc>>;

    async fn find_quiz_start(&self, user_id: i64, quiz_id: i64)
    -> StoreResult<Option<DateTime<Utc>>>;

    // --- Attempts ---

    /// Fails with `Conflict` if (user_id, quiz_id) already has an attempt,
    /// including when two inserts race.
    async fn insert_attempt(&self, attempt: NewAttempt) -> StoreResult<Attempt>;

    async fn find_attempt(&self, user_id: i64, quiz_id: i64) -> StoreResult<Option<Attempt>>;

    async fn count_attempts(&self, quiz_id: i64) -> StoreResult<usize>;

    /// Matching attempts, newest first.
    async fn list_attempt_records(&self, filter: AttemptFilter) -> StoreResult<Vec<AttemptRecord>>;
}
