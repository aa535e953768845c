//! End-to-end signed webhook delivery: a worker posts a `GradingWebhook` to
//! a local HTTP server that verifies the HMAC signature the same way the
//! gateway's `webhooks::verify` does (§6.3).

use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use conveyor_shared::webhook::{self, SIGNATURE_HEADER};
use conveyor_shared::webhook_payloads::GradingWebhook;
use uuid::Uuid;

const SECRET: &str = "test-webhook-secret";

#[derive(Clone, Default)]
struct Received(Arc<Mutex<Option<GradingWebhook>>>);

async fn grading_handler(
    State(received): State<Received>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let Some(signature) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
        return StatusCode::UNAUTHORIZED;
    };
    match webhook::verify(SECRET, &body, signature) {
        Ok(true) => {}
        _ => return StatusCode::UNAUTHORIZED,
    }
    let Ok(payload) = serde_json::from_slice::<GradingWebhook>(&body) else {
        return StatusCode::BAD_REQUEST;
    };
    *received.0.lock().unwrap() = Some(payload);
    StatusCode::NO_CONTENT
}

#[tokio::test]
async fn signed_grading_webhook_is_accepted_and_parsed() {
    let received = Received::default();
    let app = Router::new()
        .route("/webhooks/grading", post(grading_handler))
        .with_state(received.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::new();
    let payload = GradingWebhook {
        task_id: Uuid::new_v4(),
        visitor_id: Uuid::new_v4(),
        score: 87.5,
        intent_signals: vec!["asked about pricing".into()],
        engagement_level: "high".into(),
        key_interests: vec!["enterprise plan".into()],
        recommended_actions: vec!["schedule a demo".into()],
        reasoning: "visitor asked for a quote twice".into(),
    };

    conveyor_scoring_worker::webhook::post(
        &client,
        &format!("http://{addr}"),
        "/webhooks/grading",
        SECRET,
        &payload,
    )
    .await;

    let stored = received.0.lock().unwrap().clone().expect("webhook delivered");
    assert_eq!(stored.visitor_id, payload.visitor_id);
    assert_eq!(stored.score, payload.score);
}

#[tokio::test]
async fn webhook_rejected_when_secret_does_not_match() {
    let received = Received::default();
    let app = Router::new()
        .route("/webhooks/grading", post(grading_handler))
        .with_state(received.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::new();
    let payload = GradingWebhook {
        task_id: Uuid::new_v4(),
        visitor_id: Uuid::new_v4(),
        score: 10.0,
        intent_signals: vec![],
        engagement_level: "low".into(),
        key_interests: vec![],
        recommended_actions: vec![],
        reasoning: "no signal".into(),
    };

    // Signs with the wrong secret; the server should reject and never store it,
    // and the client's retry loop exhausts without success but does not panic.
    conveyor_scoring_worker::webhook::post(
        &client,
        &format!("http://{addr}"),
        "/webhooks/grading",
        "wrong-secret",
        &payload,
    )
    .await;

    assert!(received.0.lock().unwrap().is_none());
}
