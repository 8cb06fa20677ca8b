// tests/router_tests.rs

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use mathmaster::{config::Config, routes, state::AppState};
use tower::ServiceExt;

fn app() -> Router {
    routes::create_router(AppState::in_memory(Config::for_tests("router_test_secret")))
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn unknown_route_is_404() {
    let response = app()
        .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn every_protected_route_needs_a_token() {
    let app = app();

    for uri in [
        "/api/auth/role",
        "/api/classes",
        "/api/classes/1",
        "/api/classes/1/students",
        "/api/classes/1/quizzes",
        "/api/classes/1/quizzes/1",
        "/api/quizzes",
        "/api/leaderboard",
        "/api/dashboard",
        "/api/analytics",
        "/api/students",
        "/api/students/1",
        "/api/admin/users",
    ] {
        let response = app
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
    }
}

#[tokio::test]
async fn malformed_authorization_header_is_401() {
    let response = app()
        .oneshot(
            Request::get("/api/dashboard")
                .header(header::AUTHORIZATION, "Token abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_json_is_400() {
    let response = app()
        .oneshot(json_request("POST", "/api/auth/register", "{\"email\":"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn short_password_is_rejected() {
    let response = app()
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            r#"{"email":"ada@school.edu","password":"123","role":"STUDENT"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
