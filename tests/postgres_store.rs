// tests/postgres_store.rs
//
// Runs against a live database:
//   DATABASE_URL=postgres://... cargo test --test postgres_store -- --ignored

use mathmaster::{
    models::{
        attempt::{AttemptFilter, NewAttempt},
        question::NewQuestion,
        user::{NewUser, Role},
    },
    store::{Store, StoreError, postgres::PgStore},
};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

async fn store() -> PgStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("Failed to connect to Postgres");
    let store = PgStore::new(pool);
    store.run_migrations().await.expect("Failed to run migrations");
    store
}

/// Unique email so runs don't collide on the same database.
fn email(prefix: &str) -> String {
    format!("{}-{}@test.local", prefix, Uuid::new_v4())
}

fn user(email: String, role: Role) -> NewUser {
    NewUser {
        name: Some("Test".to_string()),
        email,
        password: "not-a-real-hash".to_string(),
        role,
    }
}

fn question(answer: &str) -> NewQuestion {
    NewQuestion {
        prompt: "Pick".to_string(),
        options: vec!["A".to_string(), "B".to_string()],
        correct_option: answer.to_string(),
        explanation: None,
    }
}

#[tokio::test]
#[ignore]
async fn duplicate_email_is_a_conflict() {
    let store = store().await;
    let address = email("dup");

    store.create_user(user(address.clone(), Role::Student)).await.unwrap();
    let err = store.create_user(user(address, Role::Student)).await.unwrap_err();

    assert!(matches!(err, StoreError::Conflict(_)));
}

#[tokio::test]
#[ignore]
async fn one_attempt_per_student_and_cascading_delete() {
    let store = store().await;
    let teacher = store.create_user(user(email("t"), Role::Teacher)).await.unwrap();
    let student = store.create_user(user(email("s"), Role::Student)).await.unwrap();

    let code = Uuid::new_v4().simple().to_string()[..6].to_uppercase();
    let class = store.create_class(teacher.id, "Algebra", &code).await.unwrap();
    let class = store.add_student(class.id, student.id).await.unwrap();
    assert_eq!(class.student_ids, vec![student.id]);

    let quiz = store
        .create_quiz(class.id, "Basics", None, vec![question("A"), question("B")])
        .await
        .unwrap();
    assert_eq!(quiz.questions.len(), 2);
    assert_eq!(quiz.questions[1].position, 1);

    let attempt = NewAttempt {
        user_id: student.id,
        quiz_id: quiz.id,
        score: 1,
        max_score: 2,
        answers: vec![Some("A".to_string()), None],
    };
    store.insert_attempt(attempt.clone()).await.unwrap();
    let err = store.insert_attempt(attempt).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));

    let err = store.replace_questions(quiz.id, vec![question("A")]).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));

    let records = store
        .list_attempt_records(AttemptFilter {
            class_id: Some(class.id),
            ..AttemptFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].class_name, "Algebra");

    assert!(store.delete_class(class.id).await.unwrap());
    assert!(store.find_quiz(quiz.id).await.unwrap().is_none());
    assert_eq!(store.count_attempts(quiz.id).await.unwrap(), 0);
}
