//! src/store/memory.rs
//!
//! `Store` kept in process memory. Every table sits behind one `RwLock`, so
//! each trait method is atomic with respect to the others.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::models::{
    attempt::{Attempt, AttemptFilter, AttemptRecord, NewAttempt},
    class::Class,
    question::{NewQuestion, Question},
    quiz::Quiz,
    user::{NewUser, Role, User},
};

use super::{Store, StoreError, StoreResult, UserUpdate};

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: BTreeMap<i64, User>,
    classes: BTreeMap<i64, Class>,
    quizzes: BTreeMap<i64, Quiz>,
    attempts: BTreeMap<i64, Attempt>,
    starts: HashMap<(i64, i64), DateTime<Utc>>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn build_questions(&mut self, questions: Vec<NewQuestion>) -> Vec<Question> {
        questions
            .into_iter()
            .enumerate()
            .map(|(i, q)| Question {
                id: self.next_id(),
                position: i as i32,
                prompt: q.prompt,
                options: q.options,
                correct_option: q.correct_option,
                explanation: q.explanation,
            })
            .collect()
    }

    fn remove_quiz(&mut self, quiz_id: i64) -> bool {
        self.attempts.retain(|_, a| a.quiz_id != quiz_id);
        self.starts.retain(|(_, q), _| *q != quiz_id);
        self.quizzes.remove(&quiz_id).is_some()
    }

    fn remove_class(&mut self, class_id: i64) -> bool {
        let quiz_ids: Vec<i64> = self
            .quizzes
            .values()
            .filter(|q| q.class_id == class_id)
            .map(|q| q.id)
            .collect();
        for quiz_id in quiz_ids {
            self.remove_quiz(quiz_id);
        }
        self.classes.remove(&class_id).is_some()
    }

    fn record(&self, a: &Attempt) -> Option<AttemptRecord> {
        let user = self.users.get(&a.user_id)?;
        let quiz = self.quizzes.get(&a.quiz_id)?;
        let class = self.classes.get(&quiz.class_id)?;
        Some(AttemptRecord {
            attempt_id: a.id,
            user_id: user.id,
            student_name: user.name.clone(),
            student_email: user.email.clone(),
            student_role: user.role,
            quiz_id: quiz.id,
            quiz_title: quiz.title.clone(),
            class_id: class.id,
            class_name: class.name.clone(),
            teacher_id: class.teacher_id,
            score: a.score,
            max_score: a.max_score,
            created_at: a.created_at,
        })
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut t = self.tables.write().await;
        if t.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict(format!(
                "Email '{}' already registered",
                user.email
            )));
        }
        let id = t.next_id();
        let user = User {
            id,
            name: user.name,
            email: user.email,
            password: user.password,
            role: user.role,
            created_at: Utc::now(),
        };
        t.users.insert(id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users.values().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let t = self.tables.read().await;
        Ok(t.users.values().rev().cloned().collect())
    }

    async fn list_users_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<User>> {
        let t = self.tables.read().await;
        Ok(t
            .users
            .values()
            .filter(|u| ids.contains(&u.id))
            .cloned()
            .collect())
    }

    async fn count_users_with_role(&self, role: Role) -> StoreResult<usize> {
        let t = self.tables.read().await;
        Ok(t.users.values().filter(|u| u.role == role).count())
    }

    async fn update_user(&self, id: i64, update: UserUpdate) -> StoreResult<User> {
        let mut t = self.tables.write().await;
        let user = t
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("User not found".to_string()))?;
        if let Some(name) = update.name {
            user.name = Some(name);
        }
        if let Some(role) = update.role {
            user.role = role;
        }
        if let Some(password) = update.password {
            user.password = password;
        }
        Ok(user.clone())
    }

    async fn delete_user(&self, id: i64) -> StoreResult<bool> {
        let mut t = self.tables.write().await;
        if t.users.remove(&id).is_none() {
            return Ok(false);
        }
        let owned: Vec<i64> = t
            .classes
            .values()
            .filter(|c| c.teacher_id == id)
            .map(|c| c.id)
            .collect();
        for class_id in owned {
            t.remove_class(class_id);
        }
        t.attempts.retain(|_, a| a.user_id != id);
        t.starts.retain(|(u, _), _| *u != id);
        for class in t.classes.values_mut() {
            class.student_ids.retain(|s| *s != id);
        }
        Ok(true)
    }

    async fn create_class(&self, teacher_id: i64, name: &str, code: &str) -> StoreResult<Class> {
        let mut t = self.tables.write().await;
        if t.classes.values().any(|c| c.code == code) {
            return Err(StoreError::Conflict(format!("Class code '{}' is taken", code)));
        }
        let id = t.next_id();
        let class = Class {
            id,
            name: name.to_string(),
            code: code.to_string(),
            teacher_id,
            student_ids: Vec::new(),
            created_at: Utc::now(),
        };
        t.classes.insert(id, class.clone());
        Ok(class)
    }

    async fn find_class(&self, id: i64) -> StoreResult<Option<Class>> {
        Ok(self.tables.read().await.classes.get(&id).cloned())
    }

    async fn find_class_by_code(&self, code: &str) -> StoreResult<Option<Class>> {
        let t = self.tables.read().await;
        Ok(t.classes.values().find(|c| c.code == code).cloned())
    }

    async fn list_classes_by_teacher(&self, teacher_id: i64) -> StoreResult<Vec<Class>> {
        let t = self.tables.read().await;
        Ok(t
            .classes
            .values()
            .filter(|c| c.teacher_id == teacher_id)
            .cloned()
            .collect())
    }

    async fn list_classes_by_student(&self, student_id: i64) -> StoreResult<Vec<Class>> {
        let t = self.tables.read().await;
        Ok(t
            .classes
            .values()
            .filter(|c| c.student_ids.contains(&student_id))
            .cloned()
            .collect())
    }

    async fn add_student(&self, class_id: i64, student_id: i64) -> StoreResult<Class> {
        let mut t = self.tables.write().await;
        let class = t
            .classes
            .get_mut(&class_id)
            .ok_or_else(|| StoreError::NotFound("Class not found".to_string()))?;
        if class.student_ids.contains(&student_id) {
            return Err(StoreError::Conflict(
                "You are already enrolled in this class".to_string(),
            ));
        }
        class.student_ids.push(student_id);
        Ok(class.clone())
    }

    async fn delete_class(&self, id: i64) -> StoreResult<bool> {
        Ok(self.tables.write().await.remove_class(id))
    }

    async fn create_quiz(
        &self,
        class_id: i64,
        title: &str,
        time_limit: Option<i32>,
        questions: Vec<NewQuestion>,
    ) -> StoreResult<Quiz> {
        let mut t = self.tables.write().await;
        if !t.classes.contains_key(&class_id) {
            return Err(StoreError::NotFound("Class not found".to_string()));
        }
        let id = t.next_id();
        let questions = t.build_questions(questions);
        let quiz = Quiz {
            id,
            class_id,
            title: title.to_string(),
            time_limit,
            questions,
            created_at: Utc::now(),
        };
        t.quizzes.insert(id, quiz.clone());
        Ok(quiz)
    }

    async fn find_quiz(&self, id: i64) -> StoreResult<Option<Quiz>> {
        Ok(self.tables.read().await.quizzes.get(&id).cloned())
    }

    async fn list_quizzes_by_class(&self, class_id: i64) -> StoreResult<Vec<Quiz>> {
        let t = self.tables.read().await;
        Ok(t
            .quizzes
            .values()
            .filter(|q| q.class_id == class_id)
            .cloned()
            .collect())
    }

    async fn list_quizzes_by_teacher(&self, teacher_id: i64) -> StoreResult<Vec<Quiz>> {
        let t = self.tables.read().await;
        Ok(t
            .quizzes
            .values()
            .rev()
            .filter(|q| {
                t.classes
                    .get(&q.class_id)
                    .is_some_and(|c| c.teacher_id == teacher_id)
            })
            .cloned()
            .collect())
    }

    async fn replace_questions(
        &self,
        quiz_id: i64,
        questions: Vec<NewQuestion>,
    ) -> StoreResult<Quiz> {
        let mut t = self.tables.write().await;
        if !t.quizzes.contains_key(&quiz_id) {
            return Err(StoreError::NotFound("Quiz not found".to_string()));
        }
        if t.attempts.values().any(|a| a.quiz_id == quiz_id) {
            return Err(StoreError::Conflict(
                "Questions cannot be changed after students have taken the quiz".to_string(),
            ));
        }
        let questions = t.build_questions(questions);
        t.starts.retain(|(_, q), _| *q != quiz_id);
        let quiz = t
            .quizzes
            .get_mut(&quiz_id)
            .ok_or_else(|| StoreError::NotFound("Quiz not found".to_string()))?;
        quiz.questions = questions;
        Ok(quiz.clone())
    }

    async fn delete_quiz(&self, id: i64) -> StoreResult<bool> {
        Ok(self.tables.write().await.remove_quiz(id))
    }

    async fn record_quiz_start(
        &self,
        user_id: i64,
        quiz_id: i64,
        at: DateTime<Utc>,
    ) -> StoreResult<DateTime<Utc>> {
        let mut t = self.tables.write().await;
        Ok(*t.starts.entry((user_id, quiz_id)).or_insert(at))
    }

    async fn find_quiz_start(
        &self,
        user_id: i64,
        quiz_id: i64,
    ) -> StoreResult<Option<DateTime<Utc>>> {
        let t = self.tables.read().await;
        Ok(t.starts.get(&(user_id, quiz_id)).copied())
    }

    async fn insert_attempt(&self, attempt: NewAttempt) -> StoreResult<Attempt> {
        let mut t = self.tables.write().await;
        if !t.quizzes.contains_key(&attempt.quiz_id) {
            return Err(StoreError::NotFound("Quiz not found".to_string()));
        }
        if t
            .attempts
            .values()
            .any(|a| a.user_id == attempt.user_id && a.quiz_id == attempt.quiz_id)
        {
            return Err(StoreError::Conflict("Quiz already taken".to_string()));
        }
        let id = t.next_id();
        let attempt = Attempt {
            id,
            user_id: attempt.user_id,
            quiz_id: attempt.quiz_id,
            score: attempt.score,
            max_score: attempt.max_score,
            answers: attempt.answers,
            created_at: Utc::now(),
        };
        t.attempts.insert(id, attempt.clone());
        Ok(attempt)
    }

    async fn find_attempt(&self, user_id: i64, quiz_id: i64) -> StoreResult<Option<Attempt>> {
        let t = self.tables.read().await;
        Ok(t
            .attempts
            .values()
            .find(|a| a.user_id == user_id && a.quiz_id == quiz_id)
            .cloned())
    }

    async fn count_attempts(&self, quiz_id: i64) -> StoreResult<usize> {
        let t = self.tables.read().await;
        Ok(t.attempts.values().filter(|a| a.quiz_id == quiz_id).count())
    }

    async fn list_attempt_records(&self, filter: AttemptFilter) -> StoreResult<Vec<AttemptRecord>> {
        let t = self.tables.read().await;
        let mut records: Vec<AttemptRecord> = t
            .attempts
            .values()
            .filter_map(|a| t.record(a))
            .filter(|r| filter.matches(r))
            .collect();
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.attempt_id.cmp(&a.attempt_id))
        });
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    async fn seed() -> (Arc<MemoryStore>, User, User, Class, Quiz) {
        let store = Arc::new(MemoryStore::new());
        let teacher = store
            .create_user(NewUser {
                name: Some("T".into()),
                email: "t@school.test".into(),
                password: "x".into(),
                role: Role::Teacher,
            })
            .await
            .unwrap();
        let student = store
            .create_user(NewUser {
                name: Some("S".into()),
                email: "s@school.test".into(),
                password: "x".into(),
                role: Role::Student,
            })
            .await
            .unwrap();
        let class = store.create_class(teacher.id, "Algebra", "AB12CD").await.unwrap();
        let class = store.add_student(class.id, student.id).await.unwrap();
        let quiz = store
            .create_quiz(
                class.id,
                "Q1",
                None,
                vec![NewQuestion {
                    prompt: "p".into(),
                    options: vec!["A".into(), "B".into()],
                    correct_option: "A".into(),
                    explanation: None,
                }],
            )
            .await
            .unwrap();
        (store, teacher, student, class, quiz)
    }

    fn attempt(user_id: i64, quiz_id: i64) -> NewAttempt {
        NewAttempt {
            user_id,
            quiz_id,
            score: 1,
            max_score: 1,
            answers: vec![Some("A".into())],
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let (store, ..) = seed().await;
        let err = store
            .create_user(NewUser {
                name: None,
                email: "t@school.test".into(),
                password: "x".into(),
                role: Role::Student,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn duplicate_code_and_enrollment_are_conflicts() {
        let (store, teacher, student, class, _) = seed().await;
        assert!(matches!(
            store.create_class(teacher.id, "Other", "AB12CD").await,
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            store.add_student(class.id, student.id).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_attempts_produce_exactly_one_row() {
        let (store, _, student, _, quiz) = seed().await;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let a = attempt(student.id, quiz.id);
                tokio::spawn(async move { store.insert_attempt(a).await })
            })
            .collect();

        let mut ok = 0;
        for h in handles {
            if h.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(store.count_attempts(quiz.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn replace_questions_is_refused_after_an_attempt() {
        let (store, _, student, _, quiz) = seed().await;
        let replacement = vec![NewQuestion {
            prompt: "new".into(),
            options: vec!["X".into(), "Y".into()],
            correct_option: "Y".into(),
            explanation: None,
        }];

        let updated = store
            .replace_questions(quiz.id, replacement.clone())
            .await
            .unwrap();
        assert_eq!(updated.questions[0].correct_option, "Y");

        store.insert_attempt(attempt(student.id, quiz.id)).await.unwrap();
        assert!(matches!(
            store.replace_questions(quiz.id, replacement).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn replace_questions_resets_quiz_starts() {
        let (store, _, student, _, quiz) = seed().await;
        store
            .record_quiz_start(student.id, quiz.id, Utc::now())
            .await
            .unwrap();

        store.replace_questions(quiz.id, Vec::new()).await.unwrap();

        assert!(store.find_quiz_start(student.id, quiz.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_class_cascades_to_quizzes_and_attempts() {
        let (store, _, student, class, quiz) = seed().await;
        store.insert_attempt(attempt(student.id, quiz.id)).await.unwrap();

        assert!(store.delete_class(class.id).await.unwrap());
        assert!(store.find_quiz(quiz.id).await.unwrap().is_none());
        assert!(store.find_attempt(student.id, quiz.id).await.unwrap().is_none());
        assert!(!store.delete_class(class.id).await.unwrap());
    }

    #[tokio::test]
    async fn quiz_start_is_stamped_once() {
        let (store, _, student, _, quiz) = seed().await;
        let first = Utc::now() - chrono::Duration::minutes(5);
        let stored = store.record_quiz_start(student.id, quiz.id, first).await.unwrap();
        let again = store
            .record_quiz_start(student.id, quiz.id, Utc::now())
            .await
            .unwrap();
        assert_eq!(stored, first);
        assert_eq!(again, first);
    }

    #[tokio::test]
    async fn attempt_records_are_filtered_and_joined() {
        let (store, teacher, student, class, quiz) = seed().await;
        store.insert_attempt(attempt(student.id, quiz.id)).await.unwrap();

        let all = store
            .list_attempt_records(AttemptFilter {
                teacher_id: Some(teacher.id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].class_name, class.name);
        assert_eq!(all[0].quiz_title, "Q1");

        let none = store
            .list_attempt_records(AttemptFilter {
                user_id: Some(teacher.id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
