// src/handlers/auth.rs

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;

use crate::{
    config::Config,
    error::AppError,
    models::user::{LoginRequest, NewUser, RegisterRequest, Role, normalize_email},
    store::DynStore,
    utils::{
        extract::ValidJson,
        hash::{hash_password, verify_password},
        html::clean_html,
        jwt::{CurrentUser, sign_jwt},
    },
};

/// Trims and sanitizes an optional display name; blank becomes `None`.
pub(crate) fn clean_name(name: Option<String>) -> Option<String> {
    name.map(|n| clean_html(n.trim()))
        .filter(|n| !n.is_empty())
}

/// Self-service registration for students and teachers.
///
/// Hashes the password using Argon2 before storing it.
/// Returns 201 Created and the user object (excluding password).
pub async fn register(
    State(store): State<DynStore>,
    ValidJson(payload): ValidJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.role == Role::Admin {
        return Err(AppError::BadRequest(
            "Role must be STUDENT or TEACHER".to_string(),
        ));
    }

    let hashed_password = hash_password(&payload.password)?;

    let user = store
        .create_user(NewUser {
            name: clean_name(payload.name),
            email: normalize_email(&payload.email),
            password: hashed_password,
            role: payload.role,
        })
        .await?;

    tracing::info!("Registered {} as {}", user.email, user.role);
    Ok((StatusCode::CREATED, Json(user)))
}

/// Authenticates a user and returns a JWT token.
///
/// Unknown email and wrong password give the same 401.
pub async fn login(
    State(store): State<DynStore>,
    State(config): State<Config>,
    ValidJson(payload): ValidJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let invalid = || AppError::AuthError("Invalid email or password".to_string());

    let user = store
        .find_user_by_email(&normalize_email(&payload.email))
        .await
        .map_err(|e| {
            tracing::error!("Login lookup failed: {:?}", e);
            AppError::from(e)
        })?
        .ok_or_else(invalid)?;

    if !verify_password(&payload.password, &user.password)? {
        return Err(invalid());
    }

    let token = sign_jwt(&user, &config.jwt_secret, config.jwt_expiration)?;

    Ok(Json(json!({
        "token": token,
        "type": "Bearer",
        "role": user.role,
    })))
}

/// Role of the authenticated caller, as stored.
pub async fn role(CurrentUser(user): CurrentUser) -> Result<impl IntoResponse, AppError> {
    Ok(Json(json!({ "role": user.role })))
}
