//! Wire shapes posted by worker processes back to the gateway's webhook
//! receivers (§4.5.7, §4.6, §4.7, §6.3). Shared so that a worker and the
//! gateway agree on field names without hand-duplicating the struct.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::ExtractedVisitorInfo;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionPayload {
    pub session_token: String,
    pub bot_id: Uuid,
    pub visitor_id: Uuid,
    pub query: String,
    pub response: String,
    pub tokens_input: i32,
    pub tokens_output: i32,
    pub cost_usd: f64,
    pub extracted_info: ExtractedVisitorInfo,
    pub long_term_memory: String,
    pub is_contact: bool,
    pub sources: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileBatchWebhook {
    pub task_id: Uuid,
    pub bot_id: Uuid,
    pub document_id: Uuid,
    pub batch_index: u32,
    pub batch_total: u32,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlWebhook {
    pub task_id: Uuid,
    pub bot_id: Uuid,
    pub pages_fetched: u32,
    pub pages_failed: u32,
    pub page_results: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingWebhook {
    pub task_id: Uuid,
    pub visitor_id: Uuid,
    pub score: f32,
    pub intent_signals: Vec<String>,
    pub engagement_level: String,
    pub key_interests: Vec<String>,
    pub recommended_actions: Vec<String>,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentWebhook {
    pub task_id: Uuid,
    pub visitor_id: Uuid,
    pub results: Vec<serde_json::Value>,
    pub summary: String,
    pub lead_score: f32,
}
