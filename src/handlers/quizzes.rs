// src/handlers/quizzes.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Duration, Utc};

use crate::{
    analytics,
    config::Config,
    error::AppError,
    models::{
        attempt::{AttemptFilter, NewAttempt, SubmissionResult},
        class::Class,
        question::{Question, RedactedQuestion, validate_questions},
        quiz::{
            CreateQuizRequest, FullQuizView, Quiz, QuizListItem, QuizStatus, QuizView,
            RedactedQuizView, ReviewQuizView, SubmitQuizRequest, UpdateQuestionsRequest,
        },
        user::Role,
    },
    store::{DynStore, StoreError},
    utils::{
        extract::ValidJson,
        guard::{authorize, require_role},
        html::clean_html,
        jwt::CurrentUser,
    },
};

use super::classes::load_class;

/// Number of answers matching the key.
///
/// Both sides are trimmed; comparison is case-sensitive and `None` never
/// matches. Extra answers past the last question are ignored.
pub fn grade(questions: &[Question], answers: &[Option<String>]) -> i32 {
    questions
        .iter()
        .zip(answers)
        .filter(|(q, answer)| {
            answer
                .as_deref()
                .is_some_and(|a| a.trim() == q.correct_option.trim())
        })
        .count() as i32
}

/// Loads a quiz that must belong to `class`.
async fn load_quiz(store: &DynStore, class: &Class, quiz_id: i64) -> Result<Quiz, AppError> {
    store
        .find_quiz(quiz_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load quiz {}: {:?}", quiz_id, e);
            AppError::from(e)
        })?
        .filter(|q| q.class_id == class.id)
        .ok_or_else(|| AppError::NotFound("Quiz not found".to_string()))
}

fn clean_title(raw: &str) -> Result<String, AppError> {
    let title = clean_html(raw.trim());
    if title.is_empty() {
        return Err(AppError::BadRequest("Quiz title is required".to_string()));
    }
    Ok(title)
}

/// Quizzes of a class. Owners get lifecycle status, students `alreadyTaken`.
pub async fn list_quizzes(
    State(store): State<DynStore>,
    CurrentUser(user): CurrentUser,
    Path(class_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let class = load_class(&store, class_id).await?;
    authorize(&user, &[Role::Teacher, Role::Student], |u| class.can_view(u))?;

    let quizzes = store.list_quizzes_by_class(class.id).await?;
    let records = store
        .list_attempt_records(AttemptFilter {
            class_id: Some(class.id),
            ..AttemptFilter::default()
        })
        .await?;

    let items: Vec<QuizListItem> = quizzes
        .iter()
        .map(|q| {
            let attempts = records.iter().filter(|r| r.quiz_id == q.id).count();
            if class.is_owner(&user) {
                QuizListItem::for_owner(q, attempts)
            } else {
                let taken = records
                    .iter()
                    .any(|r| r.quiz_id == q.id && r.user_id == user.id);
                QuizListItem::for_student(q, attempts, taken)
            }
        })
        .collect();

    Ok(Json(items))
}

/// Creates a quiz in the class. An empty question list makes a draft.
/// Owning teacher only.
pub async fn create_quiz(
    State(store): State<DynStore>,
    CurrentUser(user): CurrentUser,
    Path(class_id): Path<i64>,
    ValidJson(payload): ValidJson<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    let class = load_class(&store, class_id).await?;
    authorize(&user, &[Role::Teacher], |u| class.is_owner(u))?;

    let title = clean_title(&payload.title)?;
    let questions = validate_questions(payload.questions).map_err(AppError::BadRequest)?;

    let quiz = store
        .create_quiz(class.id, &title, payload.time_limit, questions)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create quiz: {:?}", e);
            AppError::from(e)
        })?;

    tracing::info!(
        "Teacher {} created quiz {} with {} questions in class {}",
        user.id,
        quiz.id,
        quiz.questions.len(),
        class.id
    );
    Ok((StatusCode::CREATED, Json(FullQuizView::new(quiz, 0))))
}

/// Returns the view of the quiz that matches the caller.
///
/// * Owning teacher: full view with answers, status and attempt count.
/// * Enrolled student who already submitted: review with their answers.
/// * Enrolled student otherwise: redacted view. The first fetch of a timed
///   quiz with questions stamps its start.
pub async fn get_quiz(
    State(store): State<DynStore>,
    CurrentUser(user): CurrentUser,
    Path((class_id, quiz_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let class = load_class(&store, class_id).await?;
    let quiz = load_quiz(&store, &class, quiz_id).await?;

    if class.is_owner(&user) {
        let attempts = store.count_attempts(quiz.id).await?;
        return Ok(Json(QuizView::Full(FullQuizView::new(quiz, attempts))));
    }

    authorize(&user, &[Role::Student], |u| class.is_member(u))?;

    if let Some(attempt) = store.find_attempt(user.id, quiz.id).await? {
        let correct_answers = quiz.questions.iter().map(|q| q.correct_option.clone()).collect();
        let explanations = quiz.questions.iter().map(|q| q.explanation.clone()).collect();
        return Ok(Json(QuizView::Review(ReviewQuizView {
            id: quiz.id,
            class_id: quiz.class_id,
            title: quiz.title,
            time_limit: quiz.time_limit,
            questions: quiz.questions,
            already_taken: true,
            score: attempt.score,
            max_score: attempt.max_score,
            selected_answers: attempt.answers,
            correct_answers,
            explanations,
        })));
    }

    // A draft has nothing to answer yet, so its clock does not start.
    let started_at = match quiz.time_limit {
        Some(_) if !quiz.questions.is_empty() => {
            Some(store.record_quiz_start(user.id, quiz.id, Utc::now()).await?)
        }
        _ => None,
    };

    Ok(Json(QuizView::Redacted(RedactedQuizView {
        id: quiz.id,
        class_id: quiz.class_id,
        title: quiz.title,
        time_limit: quiz.time_limit,
        questions: quiz.questions.iter().map(RedactedQuestion::from).collect(),
        already_taken: false,
        started_at,
    })))
}

/// Grades a submission and records the student's only attempt.
///
/// * The pre-check gives the usual "already taken" answer before grading;
///   the store's uniqueness rule settles concurrent submissions.
/// * A timed quiz with a stamped start refuses submissions past
///   `start + time_limit + grace`.
pub async fn submit_quiz(
    State(store): State<DynStore>,
    State(config): State<Config>,
    CurrentUser(user): CurrentUser,
    Path((class_id, quiz_id)): Path<(i64, i64)>,
    ValidJson(payload): ValidJson<SubmitQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    let class = load_class(&store, class_id).await?;
    authorize(&user, &[Role::Student], |u| class.is_member(u))?;
    let quiz = load_quiz(&store, &class, quiz_id).await?;

    if quiz.questions.is_empty() {
        return Err(AppError::BadRequest("This quiz has no questions".to_string()));
    }

    if store.find_attempt(user.id, quiz.id).await?.is_some() {
        return Err(AppError::AlreadyTaken);
    }

    if payload.answers.len() != quiz.questions.len() {
        return Err(AppError::BadRequest(format!(
            "Expected {} answers, got {}",
            quiz.questions.len(),
            payload.answers.len()
        )));
    }

    if let Some(limit) = quiz.time_limit {
        if let Some(started_at) = store.find_quiz_start(user.id, quiz.id).await? {
            let deadline = started_at
                + Duration::minutes(i64::from(limit))
                + Duration::seconds(config.quiz_grace_seconds);
            if Utc::now() > deadline {
                tracing::info!("Late submission by {} on quiz {}", user.id, quiz.id);
                return Err(AppError::BadRequest("Time limit exceeded".to_string()));
            }
        }
    }

    let score = grade(&quiz.questions, &payload.answers);
    let max_score = quiz.questions.len() as i32;

    let attempt = match store
        .insert_attempt(NewAttempt {
            user_id: user.id,
            quiz_id: quiz.id,
            score,
            max_score,
            answers: payload.answers,
        })
        .await
    {
        Ok(attempt) => attempt,
        Err(StoreError::Conflict(_)) => return Err(AppError::AlreadyTaken),
        Err(e) => {
            tracing::error!("Failed to record attempt: {:?}", e);
            return Err(e.into());
        }
    };

    tracing::info!(
        "Student {} scored {}/{} on quiz {}",
        user.id,
        score,
        max_score,
        quiz.id
    );

    Ok(Json(SubmissionResult {
        attempt_id: attempt.id,
        score: attempt.score,
        max_score: attempt.max_score,
        correct_answers: quiz.questions.iter().map(|q| q.correct_option.clone()).collect(),
        explanations: quiz.questions.iter().map(|q| q.explanation.clone()).collect(),
    }))
}

/// Replaces the question list. Refused with 409 once anyone has submitted.
/// Owning teacher only.
pub async fn update_questions(
    State(store): State<DynStore>,
    CurrentUser(user): CurrentUser,
    Path((class_id, quiz_id)): Path<(i64, i64)>,
    ValidJson(payload): ValidJson<UpdateQuestionsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let class = load_class(&store, class_id).await?;
    authorize(&user, &[Role::Teacher], |u| class.is_owner(u))?;
    let quiz = load_quiz(&store, &class, quiz_id).await?;

    let attempts = store.count_attempts(quiz.id).await?;
    if !QuizStatus::of(&quiz, attempts).questions_editable() {
        return Err(AppError::Conflict(
            "Questions cannot be changed after students have taken the quiz".to_string(),
        ));
    }

    let questions = validate_questions(payload.questions).map_err(AppError::BadRequest)?;
    let quiz = store.replace_questions(quiz.id, questions).await?;
    let attempts = store.count_attempts(quiz.id).await?;

    Ok(Json(FullQuizView::new(quiz, attempts)))
}

/// Deletes a quiz with its attempts.
/// Owning teacher only.
pub async fn delete_quiz(
    State(store): State<DynStore>,
    CurrentUser(user): CurrentUser,
    Path((class_id, quiz_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let class = load_class(&store, class_id).await?;
    authorize(&user, &[Role::Teacher], |u| class.is_owner(u))?;
    let quiz = load_quiz(&store, &class, quiz_id).await?;

    store.delete_quiz(quiz.id).await.map_err(|e| {
        tracing::error!("Failed to delete quiz {}: {:?}", quiz.id, e);
        AppError::from(e)
    })?;

    Ok(StatusCode::NO_CONTENT)
}

/// Every quiz across the teacher's classes with its results.
pub async fn teacher_quizzes(
    State(store): State<DynStore>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    require_role(&user, &[Role::Teacher])?;

    let classes = store.list_classes_by_teacher(user.id).await?;
    let quizzes = store.list_quizzes_by_teacher(user.id).await?;
    let records = store
        .list_attempt_records(AttemptFilter {
            teacher_id: Some(user.id),
            ..AttemptFilter::default()
        })
        .await?;

    Ok(Json(analytics::teacher_quizzes(&quizzes, &classes, &records)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn questions(keys: &[&str]) -> Vec<Question> {
        keys.iter()
            .enumerate()
            .map(|(i, key)| Question {
                id: i as i64,
                position: i as i32,
                prompt: format!("Q{}", i),
                options: vec![key.to_string(), "X".to_string(), "Y".to_string(), "Z".to_string()],
                correct_option: key.to_string(),
                explanation: None,
            })
            .collect()
    }

    fn answers(raw: &[Option<&str>]) -> Vec<Option<String>> {
        raw.iter().map(|a| a.map(str::to_string)).collect()
    }

    #[test]
    fn grade_counts_matching_answers() {
        let qs = questions(&["A", "Y"]);
        assert_eq!(grade(&qs, &answers(&[Some("A"), Some("X")])), 1);
        assert_eq!(grade(&qs, &answers(&[Some("A"), Some("Y")])), 2);
        assert_eq!(grade(&qs, &answers(&[Some("X"), Some("Z")])), 0);
    }

    #[test]
    fn grade_trims_but_respects_case() {
        let qs = questions(&["A"]);
        assert_eq!(grade(&qs, &answers(&[Some(" A ")])), 1);
        assert_eq!(grade(&qs, &answers(&[Some("a")])), 0);
    }

    #[test]
    fn unanswered_questions_never_match() {
        let qs = questions(&["A", "B"]);
        assert_eq!(grade(&qs, &answers(&[None, None])), 0);
        assert_eq!(grade(&qs, &answers(&[None, Some("B")])), 1);
    }

    #[test]
    fn every_mix_of_right_and_wrong_scores_its_count() {
        let keys = ["A", "B", "C", "D"];
        let qs = questions(&keys);
        for mask in 0u32..16 {
            let submitted: Vec<Option<String>> = keys
                .iter()
                .enumerate()
                .map(|(i, k)| {
                    if mask & (1 << i) != 0 {
                        Some(k.to_string())
                    } else {
                        Some("X".to_string())
                    }
                })
                .collect();
            assert_eq!(grade(&qs, &submitted), mask.count_ones() as i32);
        }
    }
}
