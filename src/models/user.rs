// src/models/user.rs

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

/// Closed set of account roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "STUDENT",
            Role::Teacher => "TEACHER",
            Role::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STUDENT" => Ok(Role::Student),
            "TEACHER" => Ok(Role::Teacher),
            "ADMIN" => Ok(Role::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// A persisted account.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,

    pub name: Option<String>,

    /// Unique, stored lowercased.
    pub email: String,

    /// Argon2 password hash.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password: String,

    pub role: Role,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl User {
    /// Name shown in leaderboards and activity feeds; falls back to the email.
    pub fn display_name(&self) -> String {
        display_name(self.name.as_deref(), &self.email)
    }
}

pub fn display_name(name: Option<&str>, email: &str) -> String {
    match name {
        Some(n) if !n.trim().is_empty() => n.to_string(),
        _ => email.to_string(),
    }
}

/// Insert payload for the store. `password` must already be hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: Option<String>,
    pub email: String,
    pub password: String,
    pub role: Role,
}

/// Reduced user shape for rosters and nested references.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: i64,
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// DTO for self-service registration.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
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

/// DTO for user login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 254))]
    pub email: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// Deserializes a string with surrounding whitespace removed, so validators
/// see the value that gets stored.
pub fn trimmed<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(raw.trim().to_string())
}

/// Normalizes an email for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_its_wire_name() {
        for role in [Role::Student, Role::Teacher, Role::Admin] {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
        assert!("student".parse::<Role>().is_err());
    }

    #[test]
    fn padded_email_passes_validation() {
        let req: RegisterRequest = serde_json::from_str(
            r#"{"email":"  Ada@School.edu ","password":"secret1","role":"STUDENT"}"#,
        )
        .unwrap();
        assert_eq!(req.email, "Ada@School.edu");
        assert!(req.validate().is_ok());
        assert_eq!(normalize_email(&req.email), "ada@school.edu");
    }

    #[test]
    fn display_name_falls_back_to_email() {
        assert_eq!(display_name(Some("Ada"), "ada@x.io"), "Ada");
        assert_eq!(display_name(Some("  "), "ada@x.io"), "ada@x.io");
        assert_eq!(display_name(None, "ada@x.io"), "ada@x.io");
    }
}
