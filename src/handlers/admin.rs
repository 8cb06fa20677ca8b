// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError,
    models::user::{NewUser, Role, normalize_email, trimmed},
    store::{DynStore, UserUpdate},
    utils::{extract::ValidJson, hash::hash_password, jwt::CurrentUser},
};

use super::auth::clean_name;

/// Lists all users in the system, newest first.
/// Admin only.
pub async fn list_users(State(store): State<DynStore>) -> Result<impl IntoResponse, AppError> {
    let users = store.list_users().await.map_err(|e| {
        tracing::error!("Failed to list users: {:?}", e);
        AppError::from(e)
    })?;

    Ok(Json(users))
}

/// DTO for Admin creating a user (any role).
#[derive(Debug, Deserialize, Validate)]
pub struct AdminCreateUserRequest {
    #[validate(length(max = 100, message = "Name must be at most 100 characters."))]
    pub name: Option<String>,
    #[serde(deserialize_with = "trimmed")]
    #[validate(email(message = "A valid email address is required."))]
    pub email: String,
    #[validate(length(
        min = 6,
        max = 128,
        message = "Password length must be between 6 and 128 characters."
    ))]
    pub password: String,
    pub role: Role,
}

/// Creates a new user with specific role.
/// Admin only.
pub async fn create_user(
    State(store): State<DynStore>,
    ValidJson(payload): ValidJson<AdminCreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let hashed_password = hash_password(&payload.password)?;

    let user = store
        .create_user(NewUser {
            name: clean_name(payload.name),
            email: normalize_email(&payload.email),
            password: hashed_password,
            role: payload.role,
        })
        .await?;

    tracing::info!("Admin created {} as {}", user.email, user.role);
    Ok((StatusCode::CREATED, Json(user)))
}

/// DTO for updating a user. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct AdminUpdateUserRequest {
    #[validate(length(max = 100, message = "Name must be at most 100 characters."))]
    pub name: Option<String>,
    pub role: Option<Role>,
}

/// Updates name and/or role.
/// Admin only. An admin cannot change their own role.
pub async fn update_user(
    State(store): State<DynStore>,
    CurrentUser(admin): CurrentUser,
    Path(id): Path<i64>,
    ValidJson(payload): ValidJson<AdminUpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    if id == admin.id && payload.role.is_some_and(|r| r != Role::Admin) {
        return Err(AppError::BadRequest(
            "You cannot change your own role".to_string(),
        ));
    }

    let user = store
        .update_user(
            id,
            UserUpdate {
                name: clean_name(payload.name),
                role: payload.role,
                password: None,
            },
        )
        .await?;

    Ok(Json(user))
}

/// Deletes a user by ID.
/// Admin only. Prevents deleting self and other administrators.
pub async fn delete_user(
    State(store): State<DynStore>,
    CurrentUser(admin): CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if id == admin.id {
        return Err(AppError::BadRequest(
            "You cannot delete your own account".to_string(),
        ));
    }

    let target = store
        .find_user(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if target.role == Role::Admin {
        return Err(AppError::Forbidden(
            "Administrators cannot be deleted".to_string(),
        ));
    }

    store.delete_user(id).await.map_err(|e| {
        tracing::error!("Failed to delete user {}: {:?}", id, e);
        AppError::from(e)
    })?;

    tracing::info!("Admin {} deleted user {}", admin.id, id);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(length(
        min = 6,
        max = 128,
        message = "Password length must be between 6 and 128 characters."
    ))]
    pub password: String,
}

/// Sets a new password for the user.
/// Admin only.
pub async fn reset_password(
    State(store): State<DynStore>,
    Path(id): Path<i64>,
    ValidJson(payload): ValidJson<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let hashed = hash_password(&payload.password)?;

    store
        .update_user(
            id,
            UserUpdate {
                password: Some(hashed),
                ..UserUpdate::default()
            },
        )
        .await?;

    Ok(Json(json!({ "message": "Password reset successfully" })))
}
