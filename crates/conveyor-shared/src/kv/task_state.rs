//! `TaskState(task_id)` hash and the progress pub/sub channel (§3, §4.2).

use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::KvStore;
use crate::errors::ConveyorResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Queued,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// The SSE event type a `ProgressEvent` renders as (§6.4). Distinct from
/// `TaskStatus`: several `kind`s (`Token`, `Sources`, `Metrics`) can occur
/// while `status` stays `Processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Queued,
    Progress,
    Token,
    Sources,
    Metrics,
    Done,
    Error,
}

/// A progress event `{task_id, bot_id?, progress, status, kind, message,
/// timestamp, batch_info?, result?, error?, chunk?, sources?, metrics?}`
/// (§4.2, §6.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub task_id: Uuid,
    pub bot_id: Option<Uuid>,
    pub progress: u8,
    pub status: TaskStatus,
    pub kind: EventKind,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_info: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<serde_json::Value>,
}

impl ProgressEvent {
    pub fn new(task_id: Uuid, status: TaskStatus, progress: u8) -> Self {
        let kind = match status {
            TaskStatus::Pending | TaskStatus::Queued => EventKind::Queued,
            TaskStatus::Processing => EventKind::Progress,
            TaskStatus::Completed => EventKind::Done,
            TaskStatus::Failed => EventKind::Error,
        };
        Self {
            task_id,
            bot_id: None,
            progress,
            status,
            kind,
            message: None,
            timestamp: Utc::now(),
            batch_info: None,
            result: None,
            error: None,
            chunk: None,
            sources: None,
            metrics: None,
        }
    }

    /// A single generated token, published over the streaming progress
    /// channel only (never mirrored into `TaskState`) (§4.5.4).
    pub fn token(task_id: Uuid, chunk: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Token,
            chunk: Some(chunk.into()),
            ..Self::new(task_id, TaskStatus::Processing, 0)
        }
    }

    /// The top-ranked sources for a streaming turn, sent once before the
    /// first token (§4.5.4).
    pub fn sources(task_id: Uuid, sources: Vec<serde_json::Value>) -> Self {
        Self {
            kind: EventKind::Sources,
            sources: Some(sources),
            ..Self::new(task_id, TaskStatus::Processing, 0)
        }
    }

    /// Per-node latency/token/cost metrics, sent once a turn finishes
    /// (§4.5.6).
    pub fn metrics(task_id: Uuid, metrics: serde_json::Value) -> Self {
        Self {
            kind: EventKind::Metrics,
            metrics: Some(metrics),
            ..Self::new(task_id, TaskStatus::Processing, 0)
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self.kind {
            EventKind::Queued => "queued",
            EventKind::Progress => "progress",
            EventKind::Token => "token",
            EventKind::Sources => "sources",
            EventKind::Metrics => "metrics",
            EventKind::Done => "done",
            EventKind::Error => "error",
        }
    }
}

/// Current snapshot of a task, mirrored into Redis as a hash under
/// `task_state:<task_id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    pub task_id: Uuid,
    pub bot_id: Option<Uuid>,
    pub status: TaskStatus,
    pub progress: u8,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl TaskState {
    pub fn from_event(event: &ProgressEvent) -> Self {
        Self {
            task_id: event.task_id,
            bot_id: event.bot_id,
            status: event.status,
            progress: event.progress,
            message: event.message.clone(),
            timestamp: event.timestamp,
            result: event.result.clone(),
            error: event.error.clone(),
        }
    }

    fn redis_key(task_id: Uuid) -> String {
        format!("task_state:{task_id}")
    }

    /// 24h TTL while running, compressed to 60s once a terminal status lands,
    /// so that late-reconnecting SSE clients can still observe the outcome (§3, §7).
    fn ttl_secs(status: TaskStatus) -> i64 {
        if status.is_terminal() {
            60
        } else {
            24 * 3600
        }
    }
}

impl KvStore {
    /// Dual-write: publish the progress event and mirror it into TaskState (§4.2).
    pub async fn publish_progress(&self, event: &ProgressEvent) -> ConveyorResult<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(event)?;
        let channel = format!("progress:{}", event.task_id);
        let _: () = conn.publish(&channel, &payload).await?;

        let state = TaskState::from_event(event);
        let key = TaskState::redis_key(event.task_id);
        let state_json = serde_json::to_string(&state)?;
        let _: () = conn.set(&key, state_json).await?;
        let _: () = conn
            .expire(&key, TaskState::ttl_secs(event.status))
            .await?;
        Ok(())
    }

    pub async fn get_task_state(&self, task_id: Uuid) -> ConveyorResult<Option<TaskState>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(TaskState::redis_key(task_id)).await?;
        Ok(match raw {
            Some(s) => Some(serde_json::from_str(&s)?),
            None => None,
        })
    }

    /// Publish-only, for high-frequency streaming events (`token`, `sources`,
    /// `metrics`): a reconnecting client has no use recovering these from
    /// `TaskState`, only a live SSE subscriber does, so skip the hash write
    /// that `publish_progress` does on every call (§4.5.4, §6.4).
    pub async fn publish_stream_event(&self, event: &ProgressEvent) -> ConveyorResult<()> {
        let channel = format!("progress:{}", event.task_id);
        let payload = serde_json::to_string(event)?;
        self.publish_raw(&channel, &payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_get_short_ttl() {
        assert_eq!(TaskState::ttl_secs(TaskStatus::Completed), 60);
        assert_eq!(TaskState::ttl_secs(TaskStatus::Failed), 60);
        assert_eq!(TaskState::ttl_secs(TaskStatus::Processing), 24 * 3600);
    }

    #[test]
    fn event_type_maps_completion_to_done() {
        let event = ProgressEvent::new(Uuid::new_v4(), TaskStatus::Completed, 100);
        assert_eq!(event.event_type(), "done");
        let event = ProgressEvent::new(Uuid::new_v4(), TaskStatus::Processing, 40);
        assert_eq!(event.event_type(), "progress");
    }

    #[test]
    fn event_type_maps_failure_to_error_not_done() {
        let event = ProgressEvent::new(Uuid::new_v4(), TaskStatus::Failed, 100);
        assert_eq!(event.event_type(), "error");
    }

    #[test]
    fn token_and_sources_events_carry_their_payload() {
        let token = ProgressEvent::token(Uuid::new_v4(), "hel");
        assert_eq!(token.event_type(), "token");
        assert_eq!(token.chunk.as_deref(), Some("hel"));

        let sources = ProgressEvent::sources(Uuid::new_v4(), vec![serde_json::json!({"id": 1})]);
        assert_eq!(sources.event_type(), "sources");
        assert_eq!(sources.sources.unwrap().len(), 1);
    }

    #[test]
    fn state_mirrors_event_fields() {
        let mut event = ProgressEvent::new(Uuid::new_v4(), TaskStatus::Failed, 100);
        event.error = Some("cancelled".into());
        let state = TaskState::from_event(&event);
        assert_eq!(state.error.as_deref(), Some("cancelled"));
        assert_eq!(state.status, TaskStatus::Failed);
    }
}
