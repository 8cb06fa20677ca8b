// src/utils/guard.rs

use crate::{
    error::AppError,
    models::user::{Role, User},
};

/// Single authorization check used by every protected handler.
///
/// * The role must be one of `roles`, otherwise `Forbidden`.
/// * `owns` is then evaluated against the user; `false` also yields `Forbidden`.
pub fn authorize(
    user: &User,
    roles: &[Role],
    owns: impl FnOnce(&User) -> bool,
) -> Result<(), AppError> {
    if !roles.contains(&user.role) {
        let allowed: Vec<&str> = roles.iter().map(Role::as_str).collect();
        return Err(AppError::Forbidden(format!(
            "This action requires role {}",
            allowed.join(" or ")
        )));
    }
    if !owns(user) {
        return Err(AppError::Forbidden(
            "You do not have access to this resource".to_string(),
        ));
    }
    Ok(())
}

pub fn require_role(user: &User, roles: &[Role]) -> Result<(), AppError> {
    authorize(user, roles, |_| true)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn user(role: Role) -> User {
        User {
            id: 7,
            name: None,
            email: "u@example.com".to_string(),
            password: String::new(),
            role,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn wrong_role_is_forbidden() {
        let err = require_role(&user(Role::Student), &[Role::Teacher]).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(msg) if msg.contains("TEACHER")));
    }

    #[test]
    fn ownership_predicate_is_applied_after_role() {
        let teacher = user(Role::Teacher);
        assert!(authorize(&teacher, &[Role::Teacher], |u| u.id == 7).is_ok());
        assert!(matches!(
            authorize(&teacher, &[Role::Teacher], |u| u.id == 8),
            Err(AppError::Forbidden(_))
        ));
    }
}
