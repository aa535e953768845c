mod sessions;
mod sse;
pub(crate) mod tasks;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/tasks", post(tasks::create_task))
        .route(
            "/api/v1/tasks/{task_id}/progress",
            get(sse::task_progress_stream),
        )
        .route("/api/v1/chat/stream/{task_id}", get(sse::task_progress_stream))
        .route("/api/v1/sessions/{session_token}/close", post(sessions::close_session))
        .merge(crate::webhooks::router())
        .with_state(state)
}
