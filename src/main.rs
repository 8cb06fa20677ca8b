// src/main.rs

use std::{sync::Arc, time::Duration};

use mathmaster::{
    config::{Config, StorageBackend},
    models::user::{NewUser, Role, normalize_email},
    routes,
    state::AppState,
    store::{DynStore, MemoryStore, PgStore},
    utils::hash::hash_password,
};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration from environment (and .env, if present)
    let config = Config::from_env()?;

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    let store: DynStore = match config.storage {
        StorageBackend::Postgres => Arc::new(connect_postgres(&config).await?),
        StorageBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on shutdown.");
            Arc::new(MemoryStore::new())
        }
    };

    // Seed Admin User
    if let Err(e) = seed_admin_user(&store, &config).await {
        tracing::error!("Failed to seed admin user: {:?}", e);
    }

    let state = AppState::new(store, config.clone());
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Connects with retry, then applies the embedded migrations.
async fn connect_postgres(config: &Config) -> Result<PgStore, Box<dyn std::error::Error>> {
    let url = config
        .database_url
        .as_deref()
        .ok_or("DATABASE_URL is required for postgres storage")?;

    let mut retry_count = 0;
    let pool = loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(url)
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    return Err(format!(
                        "Failed to connect to database after 5 retries: {}",
                        e
                    )
                    .into());
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    };

    tracing::info!("Database connected...");

    let store = PgStore::new(pool);
    tracing::info!("Running migrations...");
    store.run_migrations().await?;
    tracing::info!("Migrations applied successfully.");

    Ok(store)
}

async fn seed_admin_user(
    store: &DynStore,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    if let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) {
        let email = normalize_email(email);
        if store.find_user_by_email(&email).await?.is_none() {
            tracing::info!("Seeding admin user: {}", email);
            store
                .create_user(NewUser {
                    name: Some("Administrator".to_string()),
                    email,
                    password: hash_password(password)?,
                    role: Role::Admin,
                })
                .await?;
            tracing::info!("Admin user created successfully.");
        }
    }
    Ok(())
}
