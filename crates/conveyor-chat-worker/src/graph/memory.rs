//! Memory node (§4.5.5): writes a concise bullet-point summary of durable
//! user facts, with a sticky `- Contact Requested: Yes` bullet once a
//! contact request is detected.

use conveyor_shared::llm::ChatMessage;

use crate::key_selection;
use crate::provider_config;
use crate::state::ChatState;
use crate::ChatWorkerState;

pub async fn run(worker: &ChatWorkerState, state: &mut ChatState) {
    let contact_requested = detect_contact_request(worker, state).await;
    let has_contact_field = state.visitor.phone.is_some() || state.visitor.email.is_some();
    if contact_requested && has_contact_field {
        state.is_contact = true;
    }

    let summary = summarize(worker, state).await;
    let mut memory = summary.unwrap_or_else(|| state.long_term_memory.clone().unwrap_or_default());

    if state.is_contact && !memory.contains("Contact Requested: Yes") {
        if !memory.is_empty() {
            memory.push('\n');
        }
        memory.push_str("- Contact Requested: Yes");
    }

    state.long_term_memory = Some(memory);
}

async fn detect_contact_request(worker: &ChatWorkerState, state: &ChatState) -> bool {
    let messages = vec![
        ChatMessage::system(
            "Answer strictly `true` or `false`: did the visitor ask to be contacted \
             (call, email, follow up) in this message?",
        ),
        ChatMessage::user(state.query.clone()),
    ];
    match call(worker, state, &messages).await {
        Ok(content) => content.to_lowercase().contains("true"),
        Err(()) => false,
    }
}

async fn summarize(worker: &ChatWorkerState, state: &ChatState) -> Option<String> {
    let mut messages = vec![ChatMessage::system(
        "Produce incremental bullet points of durable facts about this visitor, \
         merging with the existing summary. Keep it concise.",
    )];
    if let Some(existing) = &state.long_term_memory {
        messages.push(ChatMessage::system(format!("Existing summary:\n{existing}")));
    }
    messages.extend(state.recent_turns(10));
    messages.push(ChatMessage::user(state.query.clone()));
    messages.push(ChatMessage::assistant(state.response.clone()));

    call(worker, state, &messages).await.ok()
}

async fn call(worker: &ChatWorkerState, state: &ChatState, messages: &[ChatMessage]) -> Result<String, ()> {
    let provider = provider_config::fetch(worker, state.bot_id).await.map_err(|_| ())?;
    let credential = key_selection::select_for_bot(worker, state.bot_id, &provider)
        .await
        .map_err(|_| ())?;
    worker
        .llm
        .complete(&credential.key, &provider.model, messages)
        .await
        .map(|r| r.content)
        .map_err(|_| ())
}
