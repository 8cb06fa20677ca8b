// src/utils/jwt.rs

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::{FromRef, FromRequestParts, State},
    http::{Request, header, request::Parts},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    error::AppError,
    models::user::{Role, User},
    store::DynStore,
};

/// JWT Claims structure.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// Subject - the user id as a string.
    pub sub: String,
    /// Lookup key for the identity resolver.
    pub email: String,
    /// Role at issuance. Informational; authorization uses the stored role.
    pub role: String,
    /// Expiration time as Unix timestamp.
    pub exp: usize,
}

/// Signs an HS256 token for the user, valid for `expiration_seconds`.
pub fn sign_jwt(user: &User, secret: &str, expiration_seconds: u64) -> Result<String, AppError> {
    let expiration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .as_secs()
        + expiration_seconds;

    let claims = Claims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        role: user.role.as_str().to_owned(),
        exp: expiration as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Verifies and decodes a JWT string.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Invalid or expired token".to_string()))?;

    Ok(token_data.claims)
}

/// Axum Middleware: Authentication.
///
/// Validates the `Authorization: Bearer <token>` header and injects `Claims`
/// into the request extensions. Anything else is a 401.
pub async fn auth_middleware(
    State(config): State<Config>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::AuthError("Not authenticated".to_string()))?;

    let claims = verify_jwt(token, &config.jwt_secret)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Axum Middleware: Admin Authorization.
///
/// Must run after `auth_middleware`. Resolves the caller and checks the
/// stored role, so a demotion takes effect before the token expires.
pub async fn admin_middleware(
    State(store): State<DynStore>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let claims = req
        .extensions()
        .get::<Claims>()
        .ok_or_else(|| AppError::AuthError("Not authenticated".to_string()))?;

    let user = resolve_identity(&store, claims).await?;
    if user.role != Role::Admin {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }

    Ok(next.run(req).await)
}

/// Identity resolver: verified claims to the persisted user.
pub async fn resolve_identity(store: &DynStore, claims: &Claims) -> Result<User, AppError> {
    store
        .find_user_by_email(&claims.email)
        .await
        .map_err(|e| {
            tracing::error!("Failed to resolve user {}: {:?}", claims.email, e);
            AppError::from(e)
        })?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

/// The authenticated caller, resolved from the token's email.
///
/// Only valid on routes behind `auth_middleware`.
pub struct CurrentUser(pub User);

impl<S> FromRequestParts<S> for CurrentUser
where
    DynStore: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts
            .extensions
            .get::<Claims>()
            .cloned()
            .ok_or_else(|| AppError::AuthError("Not authenticated".to_string()))?;

        let store = DynStore::from_ref(state);
        resolve_identity(&store, &claims).await.map(CurrentUser)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn teacher() -> User {
        User {
            id: 42,
            name: Some("Ms. Noether".to_string()),
            email: "noether@school.edu".to_string(),
            password: String::new(),
            role: Role::Teacher,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn signed_token_carries_identity() {
        let token = sign_jwt(&teacher(), "secret", 60).unwrap();
        let claims = verify_jwt(&token, "secret").unwrap();
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.email, "noether@school.edu");
        assert_eq!(claims.role, "TEACHER");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = sign_jwt(&teacher(), "secret", 60).unwrap();
        assert!(matches!(
            verify_jwt(&token, "other"),
            Err(AppError::AuthError(_))
        ));
    }
}
