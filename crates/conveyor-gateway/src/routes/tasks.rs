use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use conveyor_shared::errors::ConveyorError;
use conveyor_shared::kv::{AdvisoryLock, ProgressEvent, TaskStatus};
use conveyor_shared::messaging::{TaskEnvelope, TaskPayload};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub bot_id: Uuid,
    pub payload: TaskPayload,
    #[serde(default)]
    pub priority: u8,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct CreateTaskResponse {
    pub task_id: Uuid,
    pub queue: String,
}

/// Enqueues a task envelope, acquiring the payload's advisory lock first
/// when one applies (crawl, grading, assessment) — lock-then-publish (§4.1).
pub async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let envelope = TaskEnvelope::new(req.bot_id, req.payload)
        .with_priority(req.priority)
        .with_force(req.force);
    let task_id = envelope.task_id;
    let queue = envelope.queue_name().to_string();

    let mut queued = ProgressEvent::new(task_id, TaskStatus::Pending, 0);
    queued.bot_id = Some(req.bot_id);
    queued.message = Some("queued, waiting to start".into());
    state.kv.publish_progress(&queued).await?;

    if let Some(lock) = advisory_lock_for(&envelope) {
        // Lock ownership transfers to the worker once it picks up the task;
        // this guard is deliberately not released here on the success path.
        let guard = lock.acquire(&state.kv, task_id, req.force).await?;
        if let Err(err) = state.bus.publish(&queue, &envelope).await {
            guard.release(&state.kv).await?;
            return Err(err.into());
        }
    } else {
        state.bus.publish(&queue, &envelope).await?;
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateTaskResponse { task_id, queue }),
    ))
}

fn advisory_lock_for(envelope: &TaskEnvelope) -> Option<AdvisoryLock> {
    match &envelope.payload {
        TaskPayload::Crawl { .. } | TaskPayload::Recrawl { .. } => {
            Some(AdvisoryLock::crawl(envelope.bot_id))
        }
        TaskPayload::Grading { visitor_id } => Some(AdvisoryLock::grading(*visitor_id)),
        TaskPayload::Assessment { visitor_id } => Some(AdvisoryLock::assessment(*visitor_id)),
        _ => None,
    }
}

pub struct GatewayError(ConveyorError);

impl From<ConveyorError> for GatewayError {
    fn from(err: ConveyorError) -> Self {
        Self(err)
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            ConveyorError::AlreadyRunning { .. } => StatusCode::CONFLICT,
            ConveyorError::Validation(_) => StatusCode::BAD_REQUEST,
            ConveyorError::TaskNotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.0.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advisory_lock_for_chat_is_none() {
        let envelope = TaskEnvelope::new(
            Uuid::new_v4(),
            TaskPayload::Chat {
                session_token: "tok".into(),
                query: "hi".into(),
                streaming: false,
            },
        );
        assert!(advisory_lock_for(&envelope).is_none());
    }

    #[test]
    fn advisory_lock_for_crawl_is_some() {
        let envelope = TaskEnvelope::new(
            Uuid::new_v4(),
            TaskPayload::Crawl {
                seed_urls: vec!["https://example.com".into()],
                bfs: true,
                max_pages: 50,
            },
        );
        assert!(advisory_lock_for(&envelope).is_some());
    }
}
