use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use kinisi_api::{
    auth::jwt::{create_access_token, create_refresh_token},
    build_router,
    config::Config,
    db, AppState,
};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "router-test-secret";

fn test_config() -> Config {
    Config::for_tests(SECRET)
}

fn app() -> Router {
    let config = test_config();
    // Nothing below reaches the database
    let pool = db::create_lazy_pool(&config.database_url).unwrap();
    build_router(AppState::new(pool, config))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_service() {
    let response = app()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "kinisi-api");
}

#[tokio::test]
async fn protected_route_without_token_is_401() {
    let response = app()
        .oneshot(Request::get("/api/actions").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], 401);
}

#[tokio::test]
async fn garbage_token_is_401() {
    let response = app()
        .oneshot(
            Request::get("/api/daily-logs")
                .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_token_cannot_call_api() {
    let token = create_refresh_token(Uuid::new_v4(), "a@example.com", &test_config()).unwrap();
    let response = app()
        .oneshot(
            Request::get("/api/stats/summary")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn token_signed_with_other_secret_is_401() {
    let token = create_access_token(Uuid::new_v4(), "a@example.com", &Config::for_tests("other")).unwrap();
    let response = app()
        .oneshot(
            Request::get("/api/timezones")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn access_token_lists_timezones() {
    let token = create_access_token(Uuid::new_v4(), "a@example.com", &test_config()).unwrap();
    let response = app()
        .oneshot(
            Request::get("/api/timezones")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let zones = json.as_array().unwrap();
    assert!(zones.iter().any(|z| z["value"] == "America/Los_Angeles"));
}

#[tokio::test]
async fn auth_endpoints_are_rate_limited_per_ip() {
    let app = app();
    let addr: SocketAddr = "203.0.113.7:4000".parse().unwrap();

    let mut statuses = Vec::new();
    for _ in 0..6 {
        let mut req = Request::post("/api/auth/login").body(Body::empty()).unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        let response = app.clone().oneshot(req).await.unwrap();
        statuses.push(response.status());
    }

    // Bodies are rejected before any lookup; the sixth call trips the limiter
    assert!(statuses[..5].iter().all(|s| *s != StatusCode::TOO_MANY_REQUESTS));
    assert_eq!(statuses[5], StatusCode::TOO_MANY_REQUESTS);
}
