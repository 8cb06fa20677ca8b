//! src/store/postgres.rs
//!
//! PostgreSQL implementation of `Store` on top of a `sqlx` pool. Uniqueness
//! rules live in the schema (see `migrations/`); unique violations surface as
//! `StoreError::Conflict`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder, types::Json};

use crate::models::{
    attempt::{Attempt, AttemptFilter, AttemptRecord, NewAttempt},
    class::Class,
    question::{NewQuestion, Question},
    quiz::Quiz,
    user::{NewUser, Role, User},
};

use super::{Store, StoreError, StoreResult, UserUpdate};

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

/// Maps a unique violation (SQLSTATE 23505) to `Conflict`, anything else to `Database`.
fn conflict_on_unique(err: sqlx::Error, message: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(message.to_string())
        }
        _ => {
            tracing::error!("Database error: {:?}", err);
            StoreError::from(err)
        }
    }
}

const USER_COLUMNS: &str = "id, name, email, password, role, created_at";

const CLASS_COLUMNS: &str = r#"
    c.id, c.name, c.code, c.teacher_id, c.created_at,
    ARRAY(
        SELECT cs.student_id FROM class_students cs
        WHERE cs.class_id = c.id
        ORDER BY cs.joined_at, cs.student_id
    ) AS student_ids
"#;

const QUIZ_COLUMNS: &str = "q.id, q.class_id, q.title, q.time_limit, q.created_at";

const ATTEMPT_COLUMNS: &str = "id, user_id, quiz_id, score, max_score, answers, created_at";

#[derive(FromRow)]
struct UserRow {
    id: i64,
    name: Option<String>,
    email: String,
    password: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl UserRow {
    fn into_domain(self) -> StoreResult<User> {
        let role = self.role.parse::<Role>().map_err(StoreError::Database)?;
        Ok(User {
            id: self.id,
            name: self.name,
            email: self.email,
            password: self.password,
            role,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct ClassRow {
    id: i64,
    name: String,
    code: String,
    teacher_id: i64,
    created_at: DateTime<Utc>,
    student_ids: Vec<i64>,
}

impl ClassRow {
    fn into_domain(self) -> Class {
        Class {
            id: self.id,
            name: self.name,
            code: self.code,
            teacher_id: self.teacher_id,
            student_ids: self.student_ids,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct QuizRow {
    id: i64,
    class_id: i64,
    title: String,
    time_limit: Option<i32>,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct QuestionRow {
    id: i64,
    quiz_id: i64,
    position: i32,
    prompt: String,
    options: Json<Vec<String>>,
    correct_option: String,
    explanation: Option<String>,
}

impl QuestionRow {
    fn into_domain(self) -> Question {
        Question {
            id: self.id,
            position: self.position,
            prompt: self.prompt,
            options: self.options.0,
            correct_option: self.correct_option,
            explanation: self.explanation,
        }
    }
}

#[derive(FromRow)]
struct AttemptRow {
    id: i64,
    user_id: i64,
    quiz_id: i64,
    score: i32,
    max_score: i32,
    answers: Json<Vec<Option<String>>>,
    created_at: DateTime<Utc>,
}

impl AttemptRow {
    fn into_domain(self) -> Attempt {
        Attempt {
            id: self.id,
            user_id: self.user_id,
            quiz_id: self.quiz_id,
            score: self.score,
            max_score: self.max_score,
            answers: self.answers.0,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct AttemptRecordRow {
    attempt_id: i64,
    user_id: i64,
    student_name: Option<String>,
    student_email: String,
    student_role: String,
    quiz_id: i64,
    quiz_title: String,
    class_id: i64,
    class_name: String,
    teacher_id: i64,
    score: i32,
    max_score: i32,
    created_at: DateTime<Utc>,
}

impl AttemptRecordRow {
    fn into_domain(self) -> StoreResult<AttemptRecord> {
        let student_role = self.student_role.parse::<Role>().map_err(StoreError::Database)?;
        Ok(AttemptRecord {
            attempt_id: self.attempt_id,
            user_id: self.user_id,
            student_name: self.student_name,
            student_email: self.student_email,
            student_role,
            quiz_id: self.quiz_id,
            quiz_title: self.quiz_title,
            class_id: self.class_id,
            class_name: self.class_name,
            teacher_id: self.teacher_id,
            score: self.score,
            max_score: self.max_score,
            created_at: self.created_at,
        })
    }
}

/// A database adapter that implements the `Store` port.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    async fn fetch_class(&self, filter: &str, value: ClassKey<'_>) -> StoreResult<Option<Class>> {
        let sql = format!("SELECT {} FROM classes c WHERE {}", CLASS_COLUMNS, filter);
        let query = sqlx::query_as::<_, ClassRow>(&sql);
        let row = match value {
            ClassKey::Id(id) => query.bind(id).fetch_optional(&self.pool).await?,
            ClassKey::Code(code) => query.bind(code).fetch_optional(&self.pool).await?,
        };
        Ok(row.map(ClassRow::into_domain))
    }

    /// Attaches questions to quiz rows with one extra query.
    async fn hydrate_quizzes(&self, rows: Vec<QuizRow>) -> StoreResult<Vec<Quiz>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();

        let questions = sqlx::query_as::<_, QuestionRow>(
            r#"
            SELECT id, quiz_id, position, prompt, options, correct_option, explanation
            FROM questions
            WHERE quiz_id = ANY($1)
            ORDER BY quiz_id, position
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_quiz: HashMap<i64, Vec<Question>> = HashMap::new();
        for q in questions {
            by_quiz.entry(q.quiz_id).or_default().push(q.into_domain());
        }

        Ok(rows
            .into_iter()
            .map(|r| Quiz {
                questions: by_quiz.remove(&r.id).unwrap_or_default(),
                id: r.id,
                class_id: r.class_id,
                title: r.title,
                time_limit: r.time_limit,
                created_at: r.created_at,
            })
            .collect())
    }
}

enum ClassKey<'a> {
    Id(i64),
    Code(&'a str),
}

async fn insert_questions(
    conn: &mut PgConnection,
    quiz_id: i64,
    questions: &[NewQuestion],
) -> StoreResult<()> {
    for (position, q) in questions.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO questions (quiz_id, position, prompt, options, correct_option, explanation)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(quiz_id)
        .bind(position as i32)
        .bind(&q.prompt)
        .bind(Json(&q.options))
        .bind(&q.correct_option)
        .bind(&q.explanation)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl Store for PgStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let sql = format!(
            "INSERT INTO users (name, email, password, role) VALUES ($1, $2, $3, $4) RETURNING {}",
            USER_COLUMNS
        );
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password)
            .bind(user.role.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                conflict_on_unique(e, &format!("Email '{}' already registered", user.email))
            })?
            .into_domain()
    }

    async fn find_user(&self, id: i64) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(UserRow::into_domain)
            .transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(UserRow::into_domain)
            .transpose()
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let sql = format!("SELECT {} FROM users ORDER BY id DESC", USER_COLUMNS);
        sqlx::query_as::<_, UserRow>(&sql)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(UserRow::into_domain)
            .collect()
    }

    async fn list_users_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE id = ANY($1) ORDER BY id",
            USER_COLUMNS
        );
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(UserRow::into_domain)
            .collect()
    }

    async fn count_users_with_role(&self, role: Role) -> StoreResult<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = $1")
            .bind(role.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn update_user(&self, id: i64, update: UserUpdate) -> StoreResult<User> {
        let sql = format!(
            r#"
            UPDATE users SET
                name = COALESCE($2, name),
                role = COALESCE($3, role),
                password = COALESCE($4, password)
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(&update.name)
            .bind(update.role.map(|r| r.as_str()))
            .bind(&update.password)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound("User not found".to_string()))?
            .into_domain()
    }

    async fn delete_user(&self, id: i64) -> StoreResult<bool> {
        // Memberships, owned classes, quizzes and attempts go by ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_class(&self, teacher_id: i64, name: &str, code: &str) -> StoreResult<Class> {
        let row = sqlx::query_as::<_, ClassRow>(
            r#"
            INSERT INTO classes (name, code, teacher_id)
            VALUES ($1, $2, $3)
            RETURNING id, name, code, teacher_id, created_at, ARRAY[]::BIGINT[] AS student_ids
            "#,
        )
        .bind(name)
        .bind(code)
        .bind(teacher_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, &format!("Class code '{}' is taken", code)))?;
        Ok(row.into_domain())
    }

    async fn find_class(&self, id: i64) -> StoreResult<Option<Class>> {
        self.fetch_class("c.id = $1", ClassKey::Id(id)).await
    }

    async fn find_class_by_code(&self, code: &str) -> StoreResult<Option<Class>> {
        self.fetch_class("c.code = $1", ClassKey::Code(code)).await
    }

    async fn list_classes_by_teacher(&self, teacher_id: i64) -> StoreResult<Vec<Class>> {
        let sql = format!(
            "SELECT {} FROM classes c WHERE c.teacher_id = $1 ORDER BY c.id",
            CLASS_COLUMNS
        );
        let rows = sqlx::query_as::<_, ClassRow>(&sql)
            .bind(teacher_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(ClassRow::into_domain).collect())
    }

    async fn list_classes_by_student(&self, student_id: i64) -> StoreResult<Vec<Class>> {
        let sql = format!(
            r#"
            SELECT {} FROM classes c
            WHERE EXISTS (
                SELECT 1 FROM class_students cs
                WHERE cs.class_id = c.id AND cs.student_id = $1
            )
            ORDER BY c.id
            "#,
            CLASS_COLUMNS
        );
        let rows = sqlx::query_as::<_, ClassRow>(&sql)
            .bind(student_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(ClassRow::into_domain).collect())
    }

    async fn add_student(&self, class_id: i64, student_id: i64) -> StoreResult<Class> {
        let result = sqlx::query(
            r#"
            INSERT INTO class_students (class_id, student_id)
            SELECT id, $2 FROM classes WHERE id = $1
            ON CONFLICT (class_id, student_id) DO NOTHING
            "#,
        )
        .bind(class_id)
        .bind(student_id)
        .execute(&self.pool)
        .await?;

        let class = self
            .find_class(class_id)
            .await?
            .ok_or_else(|| StoreError::NotFound("Class not found".to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(
                "You are already enrolled in this class".to_string(),
            ));
        }
        Ok(class)
    }

    async fn delete_class(&self, id: i64) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM attempts WHERE quiz_id IN (SELECT id FROM quizzes WHERE class_id = $1)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "DELETE FROM quiz_starts WHERE quiz_id IN (SELECT id FROM quizzes WHERE class_id = $1)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "DELETE FROM questions WHERE quiz_id IN (SELECT id FROM quizzes WHERE class_id = $1)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM quizzes WHERE class_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM class_students WHERE class_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM classes WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_quiz(
        &self,
        class_id: i64,
        title: &str,
        time_limit: Option<i32>,
        questions: Vec<NewQuestion>,
    ) -> StoreResult<Quiz> {
        let mut tx = self.pool.begin().await?;

        let quiz_id: i64 = sqlx::query_scalar(
            "INSERT INTO quizzes (class_id, title, time_limit) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(class_id)
        .bind(title)
        .bind(time_limit)
        .fetch_one(&mut *tx)
        .await?;

        insert_questions(&mut tx, quiz_id, &questions).await?;
        tx.commit().await?;

        self.find_quiz(quiz_id)
            .await?
            .ok_or_else(|| StoreError::NotFound("Quiz not found".to_string()))
    }

    async fn find_quiz(&self, id: i64) -> StoreResult<Option<Quiz>> {
        let sql = format!("SELECT {} FROM quizzes q WHERE q.id = $1", QUIZ_COLUMNS);
        let rows = sqlx::query_as::<_, QuizRow>(&sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
        Ok(self.hydrate_quizzes(rows).await?.into_iter().next())
    }

    async fn list_quizzes_by_class(&self, class_id: i64) -> StoreResult<Vec<Quiz>> {
        let sql = format!(
            "SELECT {} FROM quizzes q WHERE q.class_id = $1 ORDER BY q.id",
            QUIZ_COLUMNS
        );
        let rows = sqlx::query_as::<_, QuizRow>(&sql)
            .bind(class_id)
            .fetch_all(&self.pool)
            .await?;
        self.hydrate_quizzes(rows).await
    }

    async fn list_quizzes_by_teacher(&self, teacher_id: i64) -> StoreResult<Vec<Quiz>> {
        let sql = format!(
            r#"
            SELECT {} FROM quizzes q
            JOIN classes c ON c.id = q.class_id
            WHERE c.teacher_id = $1
            ORDER BY q.created_at DESC, q.id DESC
            "#,
            QUIZ_COLUMNS
        );
        let rows = sqlx::query_as::<_, QuizRow>(&sql)
            .bind(teacher_id)
            .fetch_all(&self.pool)
            .await?;
        self.hydrate_quizzes(rows).await
    }

    async fn replace_questions(
        &self,
        quiz_id: i64,
        questions: Vec<NewQuestion>,
    ) -> StoreResult<Quiz> {
        let mut tx = self.pool.begin().await?;

        // The row lock conflicts with the key-share lock an attempt insert takes
        // through its foreign key, so no attempt can land between check and write.
        let locked: Option<i64> = sqlx::query_scalar("SELECT id FROM quizzes WHERE id = $1 FOR UPDATE")
            .bind(quiz_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(StoreError::NotFound("Quiz not found".to_string()));
        }

        let attempts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attempts WHERE quiz_id = $1")
            .bind(quiz_id)
            .fetch_one(&mut *tx)
            .await?;
        if attempts > 0 {
            return Err(StoreError::Conflict(
                "Questions cannot be changed after students have taken the quiz".to_string(),
            ));
        }

        sqlx::query("DELETE FROM questions WHERE quiz_id = $1")
            .bind(quiz_id)
            .execute(&mut *tx)
            .await?;
        // Starts stamped against the old question set no longer count.
        sqlx::query("DELETE FROM quiz_starts WHERE quiz_id = $1")
            .bind(quiz_id)
            .execute(&mut *tx)
            .await?;
        insert_questions(&mut tx, quiz_id, &questions).await?;
        tx.commit().await?;

        self.find_quiz(quiz_id)
            .await?
            .ok_or_else(|| StoreError::NotFound("Quiz not found".to_string()))
    }

    async fn delete_quiz(&self, id: i64) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM attempts WHERE quiz_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM quizzes WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_quiz_start(
        &self,
        user_id: i64,
        quiz_id: i64,
        at: DateTime<Utc>,
    ) -> StoreResult<DateTime<Utc>> {
        let started: DateTime<Utc> = sqlx::query_scalar(
            r#"
            INSERT INTO quiz_starts (user_id, quiz_id, started_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, quiz_id) DO UPDATE SET started_at = quiz_starts.started_at
            RETURNING started_at
            "#,
        )
        .bind(user_id)
        .bind(quiz_id)
        .bind(at)
        .fetch_one(&self.pool)
        .await?;
        Ok(started)
    }

    async fn find_quiz_start(
        &self,
        user_id: i64,
        quiz_id: i64,
    ) -> StoreResult<Option<DateTime<Utc>>> {
        let started: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT started_at FROM quiz_starts WHERE user_id = $1 AND quiz_id = $2",
        )
        .bind(user_id)
        .bind(quiz_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(started)
    }

    async fn insert_attempt(&self, attempt: NewAttempt) -> StoreResult<Attempt> {
        let sql = format!(
            r#"
            INSERT INTO attempts (user_id, quiz_id, score, max_score, answers)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            ATTEMPT_COLUMNS
        );
        let row = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(attempt.user_id)
            .bind(attempt.quiz_id)
            .bind(attempt.score)
            .bind(attempt.max_score)
            .bind(Json(&attempt.answers))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| conflict_on_unique(e, "Quiz already taken"))?;
        Ok(row.into_domain())
    }

    async fn find_attempt(&self, user_id: i64, quiz_id: i64) -> StoreResult<Option<Attempt>> {
        let sql = format!(
            "SELECT {} FROM attempts WHERE user_id = $1 AND quiz_id = $2",
            ATTEMPT_COLUMNS
        );
        let row = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(user_id)
            .bind(quiz_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(AttemptRow::into_domain))
    }

    async fn count_attempts(&self, quiz_id: i64) -> StoreResult<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attempts WHERE quiz_id = $1")
            .bind(quiz_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn list_attempt_records(&self, filter: AttemptFilter) -> StoreResult<Vec<AttemptRecord>> {
        let mut builder = QueryBuilder::<Postgres>::new(
            r#"
            SELECT
                a.id AS attempt_id,
                a.user_id,
                u.name AS student_name,
                u.email AS student_email,
                u.role AS student_role,
                a.quiz_id,
                q.title AS quiz_title,
                q.class_id,
                c.name AS class_name,
                c.teacher_id,
                a.score,
                a.max_score,
                a.created_at
            FROM attempts a
            JOIN users u ON u.id = a.user_id
            JOIN quizzes q ON q.id = a.quiz_id
            JOIN classes c ON c.id = q.class_id
            WHERE TRUE
            "#,
        );

        if let Some(user_id) = filter.user_id {
            builder.push(" AND a.user_id = ").push_bind(user_id);
        }
        if let Some(quiz_id) = filter.quiz_id {
            builder.push(" AND a.quiz_id = ").push_bind(quiz_id);
        }
        if let Some(class_id) = filter.class_id {
            builder.push(" AND q.class_id = ").push_bind(class_id);
        }
        if let Some(teacher_id) = filter.teacher_id {
            builder.push(" AND c.teacher_id = ").push_bind(teacher_id);
        }
        if let Some(since) = filter.since {
            builder.push(" AND a.created_at >= ").push_bind(since);
        }
        builder.push(" ORDER BY a.created_at DESC, a.id DESC");

        let rows: Vec<AttemptRecordRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(AttemptRecordRow::into_domain).collect()
    }
}
