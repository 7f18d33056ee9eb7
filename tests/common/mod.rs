//! Shared fixtures for HTTP-level tests: in-memory state, seeded
//! directory, token minting, and one-shot request helpers.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use carechain::access::Role;
use carechain::auth;
use carechain::config::AppConfig;
use carechain::database::Database;
use carechain::routes::{self, AppState};

pub const JWT_SECRET: &str = "test-secret";

pub async fn test_state() -> (AppState, Database) {
    let config = AppConfig {
        database_url: "sqlite::memory:".to_string(),
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        jwt_secret: JWT_SECRET.to_string(),
    };
    let db = Database::in_memory().await.unwrap();
    db.run_migrations().await.unwrap();
    (AppState::new(config, db.clone()), db)
}

pub async fn seed_directory(state: &AppState) {
    let dir = &state.directory;
    dir.add_user("admin", Role::Admin).await.unwrap();
    dir.add_user("anilthapa", Role::Doctor).await.unwrap();
    dir.add_user("binitarai", Role::Doctor).await.unwrap();
    dir.add_user("sitasharma", Role::Patient).await.unwrap();
    dir.add_user("rambahadur", Role::Patient).await.unwrap();

    dir.add_doctor("anilthapa", "Dr. Anil Thapa", "Cardiology", "Bir Hospital")
        .await
        .unwrap();
    dir.add_doctor("binitarai", "Dr. Binita Rai", "Neurology", "Patan Hospital")
        .await
        .unwrap();

    dir.add_patient("sitasharma", "Sita Sharma", "Bir Hospital")
        .await
        .unwrap();
    dir.add_patient("rambahadur", "Ram Bahadur", "Patan Hospital")
        .await
        .unwrap();
}

pub fn token(username: &str, role: Role) -> String {
    auth::issue_token(username, role, JWT_SECRET).unwrap()
}

pub async fn get(state: &AppState, path: &str, token: Option<&str>) -> (StatusCode, Value) {
    send(state, "GET", path, None, token).await
}

pub async fn post(
    state: &AppState,
    path: &str,
    body: Value,
    token: Option<&str>,
) -> (StatusCode, Value) {
    send(state, "POST", path, Some(body), token).await
}

async fn send(
    state: &AppState,
    method: &str,
    path: &str,
    body: Option<Value>,
    token: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let body = match body {
        Some(value) => Body::from(value.to_string()),
        None => Body::empty(),
    };
    let request = builder.body(body).unwrap();

    let response = routes::app(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}
