// src/config.rs

use std::{env, net::SocketAddr, str::FromStr};

use dotenvy::dotenv;

/// Extra seconds accepted past a quiz's time limit before a submission is refused.
pub const DEFAULT_QUIZ_GRACE_SECONDS: i64 = 30;

/// Token lifetime when `JWT_EXPIRATION` is unset (one day).
pub const DEFAULT_JWT_EXPIRATION: u64 = 86_400;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which `Store` implementation backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(format!("'{}' is not a storage backend (postgres|memory)", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub storage: StorageBackend,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub quiz_grace_seconds: i64,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let bind_address = env::var("BIND_ADDRESS")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let storage = env::var("STORAGE")
            .unwrap_or_else(|_| "postgres".to_string())
            .parse::<StorageBackend>()
            .map_err(|e| ConfigError::InvalidValue("STORAGE".to_string(), e))?;

        let database_url = env::var("DATABASE_URL").ok();
        if storage == StorageBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingVar("DATABASE_URL".to_string()));
        }

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| ConfigError::MissingVar("JWT_SECRET".to_string()))?;

        let jwt_expiration = parse_or("JWT_EXPIRATION", DEFAULT_JWT_EXPIRATION)?;
        let quiz_grace_seconds = parse_or("QUIZ_GRACE_SECONDS", DEFAULT_QUIZ_GRACE_SECONDS)?;

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string())
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        Ok(Self {
            bind_address,
            storage,
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            quiz_grace_seconds,
            admin_email: env::var("ADMIN_EMAIL").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
            cors_origins,
        })
    }

    /// Configuration used by tests: in-memory storage and a fixed secret.
    pub fn for_tests(jwt_secret: &str) -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
            storage: StorageBackend::Memory,
            database_url: None,
            jwt_secret: jwt_secret.to_string(),
            jwt_expiration: 600,
            rust_log: "error".to_string(),
            quiz_grace_seconds: DEFAULT_QUIZ_GRACE_SECONDS,
            admin_email: None,
            admin_password: None,
            cors_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_backend_parses_case_insensitively() {
        assert_eq!("Memory".parse::<StorageBackend>(), Ok(StorageBackend::Memory));
        assert_eq!("postgresql".parse::<StorageBackend>(), Ok(StorageBackend::Postgres));
        assert!("mongo".parse::<StorageBackend>().is_err());
    }
}
