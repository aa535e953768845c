//! Generate node (§4.5.4): assembles the system/user prompt from retrieved
//! chunks and visitor context, calls the LLM with key-rotation retry on
//! 429, and degrades to a polite fallback if every key is exhausted —
//! the task still completes, it never fails for this reason. When the
//! turn is streaming, forwards sources and tokens over the progress
//! channel as they arrive instead of waiting for the full completion.

use conveyor_shared::kv::ProgressEvent;
use conveyor_shared::llm::{ChatMessage, CompletionResponse, CompletionUsage, LlmError};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::graph::groundedness;
use crate::key_selection::{self, SelectedCredential};
use crate::provider_config;
use crate::state::ChatState;
use crate::ChatWorkerState;

const MAX_RATE_LIMIT_RETRIES: u32 = 2;
const FALLBACK_RESPONSE: &str =
    "We're experiencing high traffic right now. Please try again in a moment.";

pub async fn run(worker: &ChatWorkerState, state: &mut ChatState, cancel: CancellationToken) {
    let system_prompt = assemble_system_prompt(state);
    state.assembled_system_prompt = system_prompt.clone();
    let user_prompt = assemble_user_prompt(state);
    let messages = vec![ChatMessage::system(system_prompt), ChatMessage::user(user_prompt)];

    let mut attempts = 0;
    loop {
        if cancel.is_cancelled() {
            return;
        }

        let Ok(provider) = provider_config::fetch(worker, state.bot_id).await else {
            state.response = FALLBACK_RESPONSE.to_string();
            return;
        };

        let Ok(credential) = key_selection::select_for_bot(worker, state.bot_id, &provider).await
        else {
            state.response = FALLBACK_RESPONSE.to_string();
            return;
        };
        state.selected_key_index = Some(credential.index);

        let call = tokio::time::timeout(
            worker.generate_timeout(),
            dispatch(worker, state, &provider.model, &messages, &credential),
        )
        .await;

        match call {
            Ok(Ok(response)) => {
                state.response = groundedness::check_and_regenerate(
                    worker,
                    &credential,
                    &provider.model,
                    &context_text(state),
                    response.content,
                )
                .await;
                state.tokens_input = response.usage.tokens_input;
                state.tokens_output = response.usage.tokens_output;
                state.cost_usd = response.usage.cost_usd;
                key_selection::record_usage(&worker.kv, state.bot_id, credential.index)
                    .await
                    .ok();
                return;
            }
            Ok(Err(LlmError::RateLimited)) => {
                key_selection::record_rate_limit(&worker.kv, state.bot_id, credential.index)
                    .await
                    .ok();
                attempts += 1;
                if attempts > MAX_RATE_LIMIT_RETRIES {
                    state.response = FALLBACK_RESPONSE.to_string();
                    return;
                }
            }
            Ok(Err(err)) => {
                warn!(%err, "generate node upstream error, using fallback response");
                state.response = FALLBACK_RESPONSE.to_string();
                return;
            }
            Err(_timeout) => {
                attempts += 1;
                if attempts > MAX_RATE_LIMIT_RETRIES {
                    state.response = FALLBACK_RESPONSE.to_string();
                    return;
                }
            }
        }
    }
}

/// Routes to a plain completion or a token-by-token stream depending on
/// `state.streaming` (§4.5.4).
async fn dispatch(
    worker: &ChatWorkerState,
    state: &ChatState,
    model: &str,
    messages: &[ChatMessage],
    credential: &SelectedCredential,
) -> Result<CompletionResponse, LlmError> {
    if !state.streaming {
        return worker.llm.complete(&credential.key, model, messages).await;
    }

    let sources: Vec<serde_json::Value> = state
        .retrieved
        .iter()
        .take(5)
        .map(|c| serde_json::json!({"document_id": c.document_id, "web_url": c.web_url}))
        .collect();
    if !sources.is_empty() {
        worker
            .kv
            .publish_stream_event(&ProgressEvent::sources(state.task_id, sources))
            .await
            .ok();
    }

    let mut stream = worker.llm.stream(&credential.key, model, messages).await?;
    let mut response = String::new();
    while let Some(token) = stream.next().await {
        let token = token?;
        response.push_str(&token);
        worker
            .kv
            .publish_stream_event(&ProgressEvent::token(state.task_id, token))
            .await
            .ok();
    }

    let tokens_output = response.split_whitespace().count() as u32;
    Ok(CompletionResponse {
        content: response,
        usage: CompletionUsage {
            tokens_input: 0,
            tokens_output,
            cost_usd: 0.0,
        },
    })
}

fn assemble_system_prompt(state: &ChatState) -> String {
    let mut prompt = format!(
        "You are {}, an assistant described as: {}.\n",
        state.bot_name, state.bot_description
    );
    if let Some(memory) = &state.long_term_memory {
        prompt.push_str("Known context about this visitor:\n");
        prompt.push_str(memory);
        prompt.push('\n');
    }
    if let Some(reflection) = &state.reflection {
        if let Some(action) = &reflection.followup_action {
            prompt.push_str(&format!("Follow up directive: {action}\n"));
        }
    }
    prompt
}

fn assemble_user_prompt(state: &ChatState) -> String {
    if state.retrieved.is_empty() {
        return state.query.clone();
    }
    let mut prompt = String::from("Context:\n");
    for (i, chunk) in state.retrieved.iter().enumerate() {
        prompt.push_str(&format!("[{}] {}\n", i + 1, chunk.text));
    }
    prompt.push_str("\nQuestion: ");
    prompt.push_str(&state.query);
    prompt
}

/// Joined retrieved-chunk text, used as the groundedness judge's context (§4.5.4).
fn context_text(state: &ChatState) -> String {
    state
        .retrieved
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use conveyor_shared::domain::Visitor;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn state() -> ChatState {
        ChatState {
            task_id: Uuid::new_v4(),
            bot_id: Uuid::new_v4(),
            session_token: "tok".into(),
            query: "what are your hours".into(),
            streaming: false,
            history: vec![],
            visitor: Visitor {
                id: Uuid::new_v4(),
                bot_id: Uuid::new_v4(),
                client_ip: "127.0.0.1".into(),
                name: None,
                email: None,
                phone: None,
                address: None,
                lead_score: None,
                lead_category: None,
                assessment: None,
                is_new: true,
                created_at: Utc::now(),
            },
            long_term_memory: Some("- likes widgets".into()),
            bot_name: "Widget Bot".into(),
            bot_description: "sells widgets".into(),
            assembled_system_prompt: String::new(),
            selected_key_index: None,
            latency_breakdown_ms: HashMap::new(),
            reflection: None,
            retrieved: vec![],
            retrieval_stage: None,
            response: String::new(),
            tokens_input: 0,
            tokens_output: 0,
            cost_usd: 0.0,
            is_contact: false,
        }
    }

    #[test]
    fn system_prompt_includes_memory() {
        let prompt = assemble_system_prompt(&state());
        assert!(prompt.contains("likes widgets"));
        assert!(prompt.contains("Widget Bot"));
    }

    #[test]
    fn user_prompt_falls_back_to_raw_query_without_retrieval() {
        let prompt = assemble_user_prompt(&state());
        assert_eq!(prompt, "what are your hours");
    }

    #[test]
    fn context_text_joins_retrieved_chunks() {
        let mut with_chunks = state();
        with_chunks.retrieved = vec![
            conveyor_shared::retrieval::RetrievedChunk {
                text: "widgets ship in 3 days".into(),
                document_id: "doc-1".into(),
                web_url: None,
                chunk_index: 0,
                score: 0.9,
                metadata: serde_json::Value::Null,
            },
            conveyor_shared::retrieval::RetrievedChunk {
                text: "support hours are 9-5".into(),
                document_id: "doc-2".into(),
                web_url: None,
                chunk_index: 0,
                score: 0.8,
                metadata: serde_json::Value::Null,
            },
        ];
        assert_eq!(
            context_text(&with_chunks),
            "widgets ship in 3 days\nsupport hours are 9-5"
        );
    }
}
