//! Final node (§4.5.6): stamps completion and sums the latency breakdown.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use conveyor_shared::domain::ExtractedVisitorInfo;
use uuid::Uuid;

use crate::state::ChatState;

pub struct TurnOutcome {
    pub task_id: Uuid,
    pub bot_id: Uuid,
    pub visitor_id: Uuid,
    pub session_token: String,
    pub query: String,
    pub response: String,
    pub tokens_input: u32,
    pub tokens_output: u32,
    pub cost_usd: f64,
    pub is_contact: bool,
    pub long_term_memory: Option<String>,
    pub extracted_info: ExtractedVisitorInfo,
    pub sources: Vec<serde_json::Value>,
    pub completed_at: DateTime<Utc>,
    pub latency_breakdown_ms: HashMap<&'static str, u64>,
}

pub fn finish(state: ChatState) -> TurnOutcome {
    let sources = state
        .retrieved
        .iter()
        .map(|c| serde_json::json!({"document_id": c.document_id, "web_url": c.web_url}))
        .collect();
    let extracted_info = state
        .reflection
        .as_ref()
        .and_then(|r| r.visitor_info.clone())
        .unwrap_or_default();

    TurnOutcome {
        task_id: state.task_id,
        bot_id: state.bot_id,
        visitor_id: state.visitor.id,
        session_token: state.session_token,
        query: state.query,
        response: state.response,
        tokens_input: state.tokens_input,
        tokens_output: state.tokens_output,
        cost_usd: state.cost_usd,
        is_contact: state.is_contact,
        long_term_memory: state.long_term_memory,
        extracted_info,
        sources,
        completed_at: Utc::now(),
        latency_breakdown_ms: state.latency_breakdown_ms,
    }
}
