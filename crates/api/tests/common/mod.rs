#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;

use huggnote_api::config::ServerConfig;
use huggnote_api::router::build_app_router;
use huggnote_api::state::AppState;
use huggnote_core::record::OrderPatch;
use huggnote_core::variation::{TaskSlot, VariationBook, VariationId};

/// Build a test `ServerConfig` with safe defaults.
///
/// Uses `http://localhost:5173` as CORS origin (matching the dev default)
/// and a 30-second request timeout.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        webhook_secret: None,
    }
}

/// Build the full application router with all middleware layers, using the
/// given database pool.
pub fn build_test_app(pool: PgPool) -> Router {
    build_test_app_with(pool, test_config())
}

pub fn build_test_app_with(pool: PgPool, config: ServerConfig) -> Router {
    build_app_router(AppState {
        pool,
        config: Arc::new(config),
    })
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn send(app: Router, method: Method, uri: &str, body: Option<serde_json::Value>) -> Response<Body> {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::POST, uri, Some(body)).await
}

pub async fn patch_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::PATCH, uri, Some(body)).await
}

pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, None).await
}

/// POST a raw body with extra headers (for signed webhook deliveries).
pub async fn post_raw(
    app: Router,
    uri: &str,
    body: &str,
    headers: &[(&str, &str)],
) -> Response<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    app.oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap()
}

/// A minimal valid form with `songs` recipients.
pub fn form_json(songs: usize) -> serde_json::Value {
    let songs: Vec<_> = (0..songs)
        .map(|i| serde_json::json!({ "recipient_name": format!("Recipient {i}"), "mood": "warm" }))
        .collect();
    serde_json::json!({
        "songs": songs,
        "sender": { "name": "Sam", "email": "sam@example.com", "message": "With love" },
        "delivery": "standard",
    })
}

/// Create an order through the API and return its id.
pub async fn create_order(pool: &PgPool, id: &str, songs: usize, user_id: Option<&str>) -> String {
    let response = post_json(
        build_test_app(pool.clone()),
        "/api/v1/orders",
        serde_json::json!({ "id": id, "form": form_json(songs), "user_id": user_id }),
    )
    .await;
    assert_eq!(response.status(), axum::http::StatusCode::CREATED);
    id.to_string()
}

/// Patch JSON that submits `task_id` for one slot.
pub fn task_patch(song: u8, variation: u8, task_id: &str) -> serde_json::Value {
    let mut book = VariationBook::default();
    book.record_task(
        song,
        VariationId::new(variation).unwrap(),
        TaskSlot::Submitted {
            task_id: task_id.to_string(),
        },
        None,
    );
    serde_json::to_value(OrderPatch {
        variations: Some(book),
        ..Default::default()
    })
    .unwrap()
}
