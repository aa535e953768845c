//! Task envelopes crossing the message bus (§4.1).
//!
//! Dynamic JSON task payloads are replaced with a tagged enum discriminated
//! on `task_type`; an envelope that fails to deserialize into a known
//! variant is routed to the DLQ rather than panicking a worker.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "task_type", content = "data", rename_all = "snake_case")]
pub enum TaskPayload {
    FileUpload {
        scratch_path: String,
        filename: String,
    },
    Crawl {
        seed_urls: Vec<String>,
        bfs: bool,
        max_pages: u32,
    },
    DeleteDocument {
        document_id: Uuid,
    },
    Recrawl {
        document_ids: Vec<Uuid>,
    },
    Chat {
        session_token: String,
        query: String,
        streaming: bool,
    },
    Grading {
        visitor_id: Uuid,
    },
    Assessment {
        visitor_id: Uuid,
    },
    Email {
        to: String,
        template: String,
        context: serde_json::Value,
    },
}

impl TaskPayload {
    pub fn queue_name(&self) -> &'static str {
        match self {
            TaskPayload::FileUpload { .. }
            | TaskPayload::Crawl { .. }
            | TaskPayload::DeleteDocument { .. }
            | TaskPayload::Recrawl { .. } => "file_processing_queue",
            TaskPayload::Chat { .. } => "chat_processing_queue",
            TaskPayload::Grading { .. } | TaskPayload::Assessment { .. } => {
                "visitor_grading_queue"
            }
            TaskPayload::Email { .. } => "email_queue",
        }
    }
}

/// Envelope `{task_id, task_type, bot_id, data}` published to a typed queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub task_id: Uuid,
    pub bot_id: Uuid,
    #[serde(flatten)]
    pub payload: TaskPayload,
    #[serde(default)]
    pub priority: u8,
    #[serde(default)]
    pub force: bool,
}

impl TaskEnvelope {
    pub fn new(bot_id: Uuid, payload: TaskPayload) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            bot_id,
            payload,
            priority: 5,
            force: false,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.min(10);
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn queue_name(&self) -> &'static str {
        self.payload.queue_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_payload_routes_to_chat_queue() {
        let env = TaskEnvelope::new(
            Uuid::new_v4(),
            TaskPayload::Chat {
                session_token: "tok".into(),
                query: "hi".into(),
                streaming: true,
            },
        );
        assert_eq!(env.queue_name(), "chat_processing_queue");
    }

    #[test]
    fn priority_clamped_to_ten() {
        let env = TaskEnvelope::new(
            Uuid::new_v4(),
            TaskPayload::Email {
                to: "a@b.com".into(),
                template: "welcome".into(),
                context: serde_json::json!({}),
            },
        )
        .with_priority(50);
        assert_eq!(env.priority, 10);
    }

    #[test]
    fn round_trips_through_json() {
        let env = TaskEnvelope::new(
            Uuid::new_v4(),
            TaskPayload::Grading {
                visitor_id: Uuid::new_v4(),
            },
        );
        let json = serde_json::to_string(&env).unwrap();
        let back: TaskEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.task_id, env.task_id);
        assert_eq!(back.queue_name(), "visitor_grading_queue");
    }

    #[test]
    fn unknown_task_type_fails_to_deserialize() {
        let json = serde_json::json!({
            "task_id": Uuid::new_v4(),
            "bot_id": Uuid::new_v4(),
            "task_type": "unknown_type",
            "data": {}
        });
        assert!(serde_json::from_value::<TaskEnvelope>(json).is_err());
    }
}
