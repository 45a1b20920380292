#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use kindred_api::auth::jwt::{generate_access_token, JwtConfig};
use kindred_api::config::ServerConfig;
use kindred_api::router::build_app_router;
use kindred_api::state::AppState;
use kindred_api::ws::WsManager;
use kindred_db::models::profile::CreateProfile;
use kindred_db::repositories::{ProfileRepo, UserRepo};
use kindred_events::EventBus;
use sqlx::PgPool;
use tower::ServiceExt;

/// Test configuration: dev CORS origin, fixed JWT secret.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        match_replay_window_hours: 72,
        jwt: JwtConfig {
            secret: "kindred-test-secret-long-enough-for-hmac".to_string(),
            access_token_expiry_mins: 15,
        },
    }
}

pub fn build_test_state(pool: PgPool) -> AppState {
    AppState {
        pool,
        config: Arc::new(test_config()),
        ws_manager: Arc::new(WsManager::new()),
        event_bus: Arc::new(EventBus::default()),
    }
}

/// Full router with the production middleware stack.
pub fn build_test_app(pool: PgPool) -> Router {
    build_app(build_test_state(pool))
}

pub fn build_app(state: AppState) -> Router {
    build_app_router(state, &test_config())
}

pub fn token_for(user_id: i64) -> String {
    generate_access_token(user_id, &test_config().jwt).expect("token generation should succeed")
}

/// Insert a user with a visible profile and return its id.
pub async fn seed_user(pool: &PgPool, name: &str) -> i64 {
    let user = UserRepo::create(pool, &format!("{name}@kindred.test"))
        .await
        .unwrap();
    ProfileRepo::create(
        pool,
        &CreateProfile {
            user_id: user.id,
            display_name: name.to_string(),
            age: Some(31),
            bio: Some(format!("{name}'s bio")),
            photo_urls: vec![format!("https://cdn.kindred.test/{name}.jpg")],
        },
    )
    .await
    .unwrap();
    user.id
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    let request = Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json_auth(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}
