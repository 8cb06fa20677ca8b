// src/handlers/classes.rs

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    analytics::{self, CLASS_RECENT_LIMIT},
    error::AppError,
    models::{
        attempt::AttemptFilter,
        class::{Class, ClassCard, ClassDetail, CreateClassRequest, JoinClassRequest, TeacherRef},
        quiz::QuizListItem,
        user::{Role, User, UserSummary},
    },
    store::{DynStore, StoreError},
    utils::{
        extract::ValidJson,
        guard::{authorize, require_role},
        html::clean_html,
        join_code,
        jwt::CurrentUser,
    },
};

/// Loads a class or fails with 404.
pub(crate) async fn load_class(store: &DynStore, id: i64) -> Result<Class, AppError> {
    store
        .find_class(id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load class {}: {:?}", id, e);
            AppError::from(e)
        })?
        .ok_or_else(|| AppError::NotFound("Class not found".to_string()))
}

async fn load_teacher(store: &DynStore, class: &Class) -> Result<User, AppError> {
    store
        .find_user(class.teacher_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Teacher not found".to_string()))
}

async fn class_card(store: &DynStore, class: &Class) -> Result<ClassCard, AppError> {
    let teacher = load_teacher(store, class).await?;
    let quizzes = store.list_quizzes_by_class(class.id).await?.len();
    Ok(ClassCard::new(class, &teacher, quizzes))
}

/// Classes of the caller: owned for teachers, joined for students.
pub async fn list_classes(
    State(store): State<DynStore>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    require_role(&user, &[Role::Teacher, Role::Student])?;

    let classes = match user.role {
        Role::Teacher => store.list_classes_by_teacher(user.id).await?,
        _ => store.list_classes_by_student(user.id).await?,
    };

    let mut cards = Vec::with_capacity(classes.len());
    for class in &classes {
        cards.push(class_card(&store, class).await?);
    }
    Ok(Json(cards))
}

/// Creates a class with a fresh join code.
///
/// * Teacher only.
/// * A generated code that is already used (or loses a race on the unique
///   constraint) is replaced, up to `join_code::MAX_ATTEMPTS` times.
pub async fn create_class(
    State(store): State<DynStore>,
    CurrentUser(user): CurrentUser,
    ValidJson(payload): ValidJson<CreateClassRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&user, &[Role::Teacher])?;

    let name = clean_html(payload.name.trim());
    if name.is_empty() {
        return Err(AppError::BadRequest(
            "Please provide a valid class name".to_string(),
        ));
    }

    for _ in 0..join_code::MAX_ATTEMPTS {
        let code = join_code::generate();
        if store.find_class_by_code(&code).await?.is_some() {
            continue;
        }

        match store.create_class(user.id, &name, &code).await {
            Ok(class) => {
                tracing::info!("Teacher {} created class {} ({})", user.id, class.id, class.code);
                return Ok((StatusCode::CREATED, Json(ClassCard::new(&class, &user, 0))));
            }
            Err(StoreError::Conflict(_)) => continue,
            Err(e) => {
                tracing::error!("Failed to create class: {:?}", e);
                return Err(e.into());
            }
        }
    }

    tracing::warn!("Join code space exhausted after {} tries", join_code::MAX_ATTEMPTS);
    Err(AppError::Conflict(
        "Could not generate a unique class code, please try again".to_string(),
    ))
}

/// Enrolls the calling student in the class with the given code.
pub async fn join_class(
    State(store): State<DynStore>,
    CurrentUser(user): CurrentUser,
    ValidJson(payload): ValidJson<JoinClassRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&user, &[Role::Student])?;

    let code = join_code::normalize(&payload.code);
    if code.is_empty() {
        return Err(AppError::BadRequest("Class code is required".to_string()));
    }

    let invalid = || AppError::NotFound("Invalid class code".to_string());
    if !join_code::is_well_formed(&code) {
        return Err(invalid());
    }

    let class = store.find_class_by_code(&code).await?.ok_or_else(invalid)?;
    let class = store.add_student(class.id, user.id).await?;

    tracing::info!("Student {} joined class {}", user.id, class.id);
    Ok(Json(class_card(&store, &class).await?))
}

/// Class detail for the owner or an enrolled student.
///
/// Students see their own recent attempts only, and no roster emails.
pub async fn get_class(
    State(store): State<DynStore>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let class = load_class(&store, id).await?;
    authorize(&user, &[Role::Teacher, Role::Student], |u| class.can_view(u))?;

    let is_owner = class.is_owner(&user);
    let teacher = load_teacher(&store, &class).await?;
    let students = store.list_users_by_ids(&class.student_ids).await?;
    let quizzes = store.list_quizzes_by_class(class.id).await?;
    let records = store
        .list_attempt_records(AttemptFilter {
            class_id: Some(class.id),
            ..AttemptFilter::default()
        })
        .await?;

    let mut attempts: HashMap<i64, usize> = HashMap::new();
    for r in &records {
        *attempts.entry(r.quiz_id).or_insert(0) += 1;
    }

    let quiz_items = quizzes
        .iter()
        .map(|q| {
            let count = attempts.get(&q.id).copied().unwrap_or(0);
            if is_owner {
                QuizListItem::for_owner(q, count)
            } else {
                let taken = records
                    .iter()
                    .any(|r| r.quiz_id == q.id && r.user_id == user.id);
                QuizListItem::for_student(q, count, taken)
            }
        })
        .collect();

    let recent_attempts = if is_owner {
        analytics::recent(&records, CLASS_RECENT_LIMIT)
    } else {
        analytics::recent(
            records.iter().filter(|r| r.user_id == user.id),
            CLASS_RECENT_LIMIT,
        )
    };

    Ok(Json(ClassDetail {
        id: class.id,
        name: class.name.clone(),
        code: class.code.clone(),
        teacher: TeacherRef {
            name: teacher.name,
            email: teacher.email,
        },
        created_at: class.created_at,
        students: students
            .into_iter()
            .map(|s| UserSummary {
                id: s.id,
                name: s.name,
                email: is_owner.then_some(s.email),
            })
            .collect(),
        quizzes: quiz_items,
        stats: analytics::class_performance(&class, quizzes.len(), &records),
        recent_attempts,
    }))
}

/// Deletes the class with everything in it.
/// Owning teacher only.
pub async fn delete_class(
    State(store): State<DynStore>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let class = load_class(&store, id).await?;
    authorize(&user, &[Role::Teacher], |u| class.is_owner(u))?;

    store.delete_class(class.id).await.map_err(|e| {
        tracing::error!("Failed to delete class {}: {:?}", class.id, e);
        AppError::from(e)
    })?;

    tracing::info!("Teacher {} deleted class {}", user.id, class.id);
    Ok(StatusCode::NO_CONTENT)
}

/// Roster with per-student results in this class.
pub async fn class_students(
    State(store): State<DynStore>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let class = load_class(&store, id).await?;
    authorize(&user, &[Role::Teacher, Role::Student], |u| class.can_view(u))?;

    let students = store.list_users_by_ids(&class.student_ids).await?;
    let records = store
        .list_attempt_records(AttemptFilter {
            class_id: Some(class.id),
            ..AttemptFilter::default()
        })
        .await?;

    Ok(Json(analytics::class_students(
        &class,
        &students,
        &records,
        class.is_owner(&user),
    )))
}
