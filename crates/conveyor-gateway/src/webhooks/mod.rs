//! Worker → gateway webhooks, authenticated by a shared HMAC signature
//! header (§6.3). The gateway is the sole writer of persisted entities, so
//! every handler here lands its payload in Postgres.

mod payloads;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use conveyor_shared::webhook::{self, SIGNATURE_HEADER};
use conveyor_shared::webhook_payloads::{
    AssessmentWebhook, ChatCompletionPayload, CrawlWebhook, FileBatchWebhook, GradingWebhook,
};
use serde::de::DeserializeOwned;

use crate::routes::tasks::GatewayError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/webhooks/chat", post(chat))
        .route("/webhooks/file", post(file))
        .route("/webhooks/crawl", post(crawl))
        .route("/webhooks/grading", post(grading))
        .route("/webhooks/assessment", post(assessment))
}

fn verify<T: DeserializeOwned>(
    secret: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<T, GatewayError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            conveyor_shared::errors::ConveyorError::Webhook("missing signature header".into())
        })?;
    let ok = webhook::verify(secret, body, signature)?;
    if !ok {
        return Err(conveyor_shared::errors::ConveyorError::Webhook("signature mismatch".into()).into());
    }
    serde_json::from_slice(body)
        .map_err(conveyor_shared::errors::ConveyorError::from)
        .map_err(Into::into)
}

async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, GatewayError> {
    let payload: ChatCompletionPayload = verify(&state.webhook_secret, &headers, &body)?;
    payloads::persist_chat_completion(&state, &payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn file(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, GatewayError> {
    let payload: FileBatchWebhook = verify(&state.webhook_secret, &headers, &body)?;
    payloads::persist_file_batch(&state, &payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn crawl(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, GatewayError> {
    let payload: CrawlWebhook = verify(&state.webhook_secret, &headers, &body)?;
    payloads::persist_crawl(&state, &payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn grading(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, GatewayError> {
    let payload: GradingWebhook = verify(&state.webhook_secret, &headers, &body)?;
    payloads::persist_grading(&state, &payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn assessment(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, GatewayError> {
    let payload: AssessmentWebhook = verify(&state.webhook_secret, &headers, &body)?;
    payloads::persist_assessment(&state, &payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_rejects_missing_header() {
        let headers = HeaderMap::new();
        let result: Result<ChatCompletionPayload, _> = verify("secret", &headers, b"{}");
        assert!(result.is_err());
    }

    #[test]
    fn verify_rejects_bad_signature() {
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, "deadbeef".parse().unwrap());
        let result: Result<ChatCompletionPayload, _> = verify("secret", &headers, b"{}");
        assert!(result.is_err());
    }
}
