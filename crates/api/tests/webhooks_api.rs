//! Integration tests for the generation-result webhook.

mod common;

use axum::http::StatusCode;
use common::{body_json, build_test_app, build_test_app_with, create_order, get, patch_json, post_raw, task_patch, test_config};
use huggnote_core::webhook::{compute_webhook_hmac, SIGNATURE_HEADER};
use sqlx::PgPool;

const WEBHOOK: &str = "/api/v1/webhooks/generation";

async fn order_with_task(pool: &PgPool, order: &str, task: &str) {
    create_order(pool, order, 1, None).await;
    let r = patch_json(
        build_test_app(pool.clone()),
        &format!("/api/v1/orders/{order}"),
        task_patch(0, 2, task),
    )
    .await;
    assert_eq!(r.status(), StatusCode::OK);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn delivery_fills_the_matching_slot(pool: PgPool) {
    order_with_task(&pool, "wh-1", "task-abc").await;

    let body = r#"{"task_id":"task-abc","lyrics":"verse one"}"#;
    let r = post_raw(build_test_app(pool.clone()), WEBHOOK, body, &[]).await;
    assert_eq!(r.status(), StatusCode::OK);
    let json = body_json(r).await;
    assert_eq!(json["data"]["ready"], false);
    assert_eq!(json["data"]["variation_id"], 2);

    let body = r#"{"task_id":"task-abc","audio_url":"https://cdn.example/abc.mp3"}"#;
    let r = post_raw(build_test_app(pool.clone()), WEBHOOK, body, &[]).await;
    let json = body_json(r).await;
    assert_eq!(json["data"]["ready"], true);

    let json = body_json(get(build_test_app(pool), "/api/v1/orders/wh-1").await).await;
    let slot = &json["data"]["variations"]["0"]["2"];
    assert_eq!(slot["audio_url"], "https://cdn.example/abc.mp3");
    assert_eq!(slot["lyrics"], "verse one");
    assert_eq!(slot["task"]["task_id"], "task-abc");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unknown_task_returns_404(pool: PgPool) {
    let body = r#"{"task_id":"never-issued","audio_url":"https://x"}"#;
    let r = post_raw(build_test_app(pool), WEBHOOK, body, &[]).await;
    assert_eq!(r.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn malformed_payload_returns_400(pool: PgPool) {
    let r = post_raw(build_test_app(pool), WEBHOOK, "not json", &[]).await;
    assert_eq!(r.status(), StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn signed_webhooks_require_a_valid_signature(pool: PgPool) {
    order_with_task(&pool, "wh-2", "task-signed").await;
    let mut config = test_config();
    config.webhook_secret = Some("shh".into());

    let body = r#"{"task_id":"task-signed","audio_url":"https://cdn.example/s.mp3"}"#;

    let r = post_raw(build_test_app_with(pool.clone(), config.clone()), WEBHOOK, body, &[]).await;
    assert_eq!(r.status(), StatusCode::UNAUTHORIZED);

    let r = post_raw(
        build_test_app_with(pool.clone(), config.clone()),
        WEBHOOK,
        body,
        &[(SIGNATURE_HEADER, "deadbeef")],
    )
    .await;
    assert_eq!(r.status(), StatusCode::UNAUTHORIZED);

    let signature = compute_webhook_hmac("shh", body.as_bytes());
    let r = post_raw(
        build_test_app_with(pool, config),
        WEBHOOK,
        body,
        &[(SIGNATURE_HEADER, signature.as_str())],
    )
    .await;
    assert_eq!(r.status(), StatusCode::OK);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn reset_song_unroutes_its_tasks(pool: PgPool) {
    order_with_task(&pool, "wh-3", "task-old").await;
    common::delete(build_test_app(pool.clone()), "/api/v1/orders/wh-3/songs/0/variations").await;

    let body = r#"{"task_id":"task-old","audio_url":"https://cdn.example/old.mp3"}"#;
    let r = post_raw(build_test_app(pool), WEBHOOK, body, &[]).await;
    assert_eq!(r.status(), StatusCode::NOT_FOUND);
}
