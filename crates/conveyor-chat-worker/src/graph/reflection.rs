//! Reflection node (§4.5.1): classifies intent, decides whether retrieval
//! is needed, and extracts any contact fields volunteered in the turn.
//! Never fails the turn — malformed or empty model output falls back to a
//! safe default.

use conveyor_shared::domain::ExtractedVisitorInfo;
use conveyor_shared::llm::ChatMessage;
use serde::Deserialize;

use crate::key_selection;
use crate::provider_config;
use crate::state::{ChatState, Intent, Reflection};
use crate::ChatWorkerState;

#[derive(Debug, Deserialize)]
struct RawReflection {
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    intent: Option<String>,
    #[serde(default)]
    needs_retrieval: Option<bool>,
    #[serde(default)]
    rewritten_query: Option<String>,
    #[serde(default)]
    followup_action: Option<String>,
    #[serde(default)]
    visitor_info: Option<ExtractedVisitorInfo>,
}

pub async fn run(worker: &ChatWorkerState, state: &mut ChatState) {
    let prompt = build_prompt(state);

    let reflection = match call(worker, state, &prompt).await {
        Ok(content) => parse(&content, &state.query),
        Err(()) => Reflection::fallback(&state.query),
    };

    if let Some(info) = &reflection.visitor_info {
        state.visitor.merge_extracted_info(info);
    }
    state.reflection = Some(reflection);
}

async fn call(worker: &ChatWorkerState, state: &ChatState, prompt: &[ChatMessage]) -> Result<String, ()> {
    let provider = provider_config::fetch(worker, state.bot_id).await.map_err(|_| ())?;
    let credential = key_selection::select_for_bot(worker, state.bot_id, &provider)
        .await
        .map_err(|_| ())?;
    worker
        .llm
        .complete(&credential.key, &provider.model, prompt)
        .await
        .map(|r| r.content)
        .map_err(|_| ())
}

fn build_prompt(state: &ChatState) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(
        "Classify the visitor's message and return strict JSON with keys \
         language, confidence, intent, needs_retrieval, rewritten_query, \
         followup_action, visitor_info.",
    )];
    messages.extend(state.recent_turns(5));
    messages.push(ChatMessage::user(state.query.clone()));
    messages
}

fn parse(raw: &str, original_query: &str) -> Reflection {
    let Ok(parsed) = serde_json::from_str::<RawReflection>(raw) else {
        return Reflection::fallback(original_query);
    };
    if raw.trim().is_empty() {
        return Reflection::fallback(original_query);
    }

    Reflection {
        language: parsed.language.unwrap_or_else(|| "default".into()),
        confidence: parsed.confidence.unwrap_or(0.0),
        intent: match parsed.intent.as_deref() {
            Some("chitchat") => Intent::Chitchat,
            _ => Intent::Question,
        },
        needs_retrieval: parsed.needs_retrieval.unwrap_or(true),
        rewritten_query: parsed
            .rewritten_query
            .filter(|q| !q.is_empty())
            .unwrap_or_else(|| original_query.to_string()),
        followup_action: parsed.followup_action,
        visitor_info: parsed.visitor_info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_json_falls_back() {
        let reflection = parse("not json", "hours?");
        assert_eq!(reflection.rewritten_query, "hours?");
        assert!(reflection.needs_retrieval);
    }

    #[test]
    fn empty_response_falls_back() {
        let reflection = parse("", "hours?");
        assert_eq!(reflection.language, "default");
    }

    #[test]
    fn well_formed_chitchat_is_parsed() {
        let raw = serde_json::json!({
            "language": "en",
            "confidence": 0.9,
            "intent": "chitchat",
            "needs_retrieval": false,
            "rewritten_query": "hello",
        })
        .to_string();
        let reflection = parse(&raw, "hi");
        assert_eq!(reflection.intent, Intent::Chitchat);
        assert!(!reflection.needs_retrieval);
    }

    #[test]
    fn missing_rewritten_query_falls_back_to_original() {
        let raw = serde_json::json!({"intent": "question"}).to_string();
        let reflection = parse(&raw, "what are your hours");
        assert_eq!(reflection.rewritten_query, "what are your hours");
    }
}
