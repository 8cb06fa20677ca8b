// src/handlers/stats.rs

use std::collections::BTreeSet;

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;

use crate::{
    analytics::{self, Timeframe},
    error::AppError,
    models::{attempt::AttemptFilter, stats::Dashboard, user::Role},
    store::DynStore,
    utils::{guard::require_role, jwt::CurrentUser},
};

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub timeframe: Option<String>,
}

/// Global student ranking over the requested window (default `all`).
pub async fn leaderboard(
    State(store): State<DynStore>,
    CurrentUser(_user): CurrentUser,
    Query(query): Query<LeaderboardQuery>,
) -> Result<impl IntoResponse, AppError> {
    let timeframe = match query.timeframe.as_deref() {
        None | Some("") => Timeframe::All,
        Some(raw) => raw.parse::<Timeframe>().map_err(AppError::BadRequest)?,
    };

    let now = Utc::now();
    let records = store
        .list_attempt_records(AttemptFilter {
            since: timeframe.since(now),
            ..AttemptFilter::default()
        })
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch leaderboard: {:?}", e);
            AppError::from(e)
        })?;

    Ok(Json(analytics::leaderboard(&records, timeframe, now)))
}

/// Teacher or student dashboard, depending on the caller's role.
pub async fn dashboard(
    State(store): State<DynStore>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    require_role(&user, &[Role::Teacher, Role::Student])?;

    if user.role == Role::Teacher {
        let classes = store.list_classes_by_teacher(user.id).await?;
        let quizzes = store.list_quizzes_by_teacher(user.id).await?;
        let records = store
            .list_attempt_records(AttemptFilter {
                teacher_id: Some(user.id),
                ..AttemptFilter::default()
            })
            .await?;
        return Ok(Json(Dashboard::Teacher(analytics::teacher_dashboard(
            &classes,
            quizzes.len(),
            &records,
        ))));
    }

    let joined = store.list_classes_by_student(user.id).await?;
    let mut quizzes = Vec::new();
    for class in &joined {
        quizzes.extend(store.list_quizzes_by_class(class.id).await?);
    }
    // The global rank needs every student's average.
    let records = store.list_attempt_records(AttemptFilter::default()).await?;

    Ok(Json(Dashboard::Student(analytics::student_dashboard(
        user.id, &joined, &quizzes, &records,
    ))))
}

/// Teacher analytics across their classes.
pub async fn teacher_analytics(
    State(store): State<DynStore>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    require_role(&user, &[Role::Teacher])?;

    let platform_students = store.count_users_with_role(Role::Student).await?;
    let classes = store.list_classes_by_teacher(user.id).await?;
    let quizzes = store.list_quizzes_by_teacher(user.id).await?;
    let records = store
        .list_attempt_records(AttemptFilter {
            teacher_id: Some(user.id),
            ..AttemptFilter::default()
        })
        .await?;

    Ok(Json(analytics::analytics(
        platform_students,
        &classes,
        &quizzes,
        &records,
    )))
}

/// Students enrolled in any of the teacher's classes.
pub async fn list_students(
    State(store): State<DynStore>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    require_role(&user, &[Role::Teacher])?;

    let classes = store.list_classes_by_teacher(user.id).await?;
    let ids: Vec<i64> = classes
        .iter()
        .flat_map(|c| c.student_ids.iter().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let students = store.list_users_by_ids(&ids).await?;
    let records = store
        .list_attempt_records(AttemptFilter {
            teacher_id: Some(user.id),
            ..AttemptFilter::default()
        })
        .await?;

    Ok(Json(analytics::students_overview(
        &classes, &students, &records,
    )))
}

/// One student's results in the teacher's classes. 404 unless the student
/// is enrolled in at least one of them.
pub async fn student_detail(
    State(store): State<DynStore>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&user, &[Role::Teacher])?;

    let not_found = || AppError::NotFound("Student not found".to_string());

    let classes: Vec<_> = store
        .list_classes_by_teacher(user.id)
        .await?
        .into_iter()
        .filter(|c| c.student_ids.contains(&id))
        .collect();
    if classes.is_empty() {
        return Err(not_found());
    }

    let student = store
        .find_user(id)
        .await?
        .filter(|u| u.role == Role::Student)
        .ok_or_else(not_found)?;

    let quizzes = store.list_quizzes_by_teacher(user.id).await?;
    let records = store
        .list_attempt_records(AttemptFilter {
            user_id: Some(student.id),
            teacher_id: Some(user.id),
            ..AttemptFilter::default()
        })
        .await?;

    Ok(Json(analytics::student_detail(
        &student, &classes, &quizzes, &records,
    )))
}
