// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, auth, classes, quizzes, stats},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Everything lives under `/api`.
/// * `/api/auth/register` and `/api/auth/login` are public; every other route
///   goes through `auth_middleware`, and `/api/admin` also through
///   `admin_middleware`.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/auth/role", get(auth::role))
        .route(
            "/classes",
            get(classes::list_classes).post(classes::create_class),
        )
        .route("/classes/join", post(classes::join_class))
        .route(
            "/classes/{id}",
            get(classes::get_class).delete(classes::delete_class),
        )
        .route("/classes/{id}/students", get(classes::class_students))
        .route(
            "/classes/{id}/quizzes",
            get(quizzes::list_quizzes).post(quizzes::create_quiz),
        )
        .route(
            "/classes/{id}/quizzes/{quiz_id}",
            get(quizzes::get_quiz)
                .post(quizzes::submit_quiz)
                .patch(quizzes::update_questions)
                .delete(quizzes::delete_quiz),
        )
        .route("/quizzes", get(quizzes::teacher_quizzes))
        .route("/leaderboard", get(stats::leaderboard))
        .route("/dashboard", get(stats::dashboard))
        .route("/analytics", get(stats::teacher_analytics))
        .route("/students", get(stats::list_students))
        .route("/students/{id}", get(stats::student_detail))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let admin_routes = Router::new()
        .route("/users", get(admin::list_users).post(admin::create_user))
        .route(
            "/users/{id}",
            put(admin::update_user).delete(admin::delete_user),
        )
        .route("/users/{id}/reset-password", post(admin::reset_password))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn_with_state(state.clone(), admin_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let api = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .nest("/admin", admin_routes);

    Router::new()
        .nest("/api", api)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
