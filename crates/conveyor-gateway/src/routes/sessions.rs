use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::routes::tasks::GatewayError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct CancelMessage<'a> {
    action: &'static str,
    session_token: &'a str,
    reason: &'static str,
}

/// Closing a session is fire-and-forget cancellation (§4.3): the gateway
/// publishes on `chat:cancel:<session_token>` and returns without waiting
/// for the chat worker's pattern subscriber to act on it.
pub async fn close_session(
    State(state): State<AppState>,
    Path(session_token): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    let channel = format!("chat:cancel:{session_token}");
    let message = CancelMessage {
        action: "cancel",
        session_token: &session_token,
        reason: "session_closed",
    };
    let payload = serde_json::to_string(&message).map_err(conveyor_shared::errors::ConveyorError::from)?;
    state.kv.publish_raw(&channel, &payload).await?;
    Ok(StatusCode::ACCEPTED)
}
