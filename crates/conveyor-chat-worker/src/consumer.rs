//! Consumer loop for `chat_processing_queue`: pulls envelopes, runs the
//! turn graph, and posts the completion webhook back to the gateway.

use std::sync::Arc;
use std::time::Duration;

use conveyor_shared::domain::{ChatMessage as PersistedMessage, Visitor};
use conveyor_shared::kv::{ProgressEvent, TaskStatus};
use conveyor_shared::messaging::{MessageBus, TaskPayload};
use conveyor_shared::webhook;
use conveyor_shared::webhook_payloads::ChatCompletionPayload;
use tracing::{error, warn};

use crate::cancellation::CancellationRegistry;
use crate::graph::{self, TurnError};
use crate::state::ChatState;
use crate::ChatWorkerState;

pub async fn run(
    worker: Arc<ChatWorkerState>,
    bus: MessageBus,
    registry: CancellationRegistry,
    queue: String,
    webhook_url: String,
    webhook_secret: String,
    prefetch: u16,
) -> conveyor_shared::errors::ConveyorResult<()> {
    let mut deliveries = bus.consume(&queue, prefetch).await?;

    while let Some(delivery) = deliveries.recv().await {
        let envelope = delivery.envelope.clone();
        let TaskPayload::Chat {
            session_token,
            query,
            streaming,
        } = envelope.payload.clone()
        else {
            warn!(task_id = %envelope.task_id, "non-chat envelope on chat queue, routing to DLQ");
            delivery.nack(false).await.ok();
            continue;
        };

        let worker = worker.clone();
        let webhook_url = webhook_url.clone();
        let webhook_secret = webhook_secret.clone();
        let cancel = registry.register(&session_token);
        let registry = registry.clone();

        tokio::spawn(async move {
            let task_id = envelope.task_id;
            let bot_id = envelope.bot_id;

            let state = match load_chat_state(&worker, task_id, bot_id, &session_token, query, streaming).await {
                Ok(state) => state,
                Err(err) => {
                    error!(%err, task_id = %task_id, "failed to load chat state");
                    delivery.nack(true).await.ok();
                    registry.unregister(&session_token);
                    return;
                }
            };

            match graph::run_turn(&worker, state, cancel).await {
                Ok(outcome) => {
                    worker
                        .kv
                        .publish_progress(&ProgressEvent::new(task_id, TaskStatus::Completed, 100))
                        .await
                        .ok();
                    post_completion_webhook(&webhook_url, &webhook_secret, &outcome).await;
                    delivery.ack().await.ok();
                }
                Err(TurnError::Cancelled) => {
                    let mut event = ProgressEvent::new(task_id, TaskStatus::Failed, 100);
                    event.error = Some("cancelled".into());
                    worker.kv.publish_progress(&event).await.ok();
                    delivery.nack(false).await.ok();
                }
            }
            registry.unregister(&session_token);
        });
    }

    Ok(())
}

async fn load_chat_state(
    worker: &ChatWorkerState,
    task_id: uuid::Uuid,
    bot_id: uuid::Uuid,
    session_token: &str,
    query: String,
    streaming: bool,
) -> Result<ChatState, sqlx::Error> {
    let session = sqlx::query_as::<_, SessionRow>(
        "SELECT id, visitor_id, long_term_memory, is_contact FROM chat_sessions WHERE token = $1",
    )
    .bind(session_token)
    .fetch_one(&worker.db)
    .await?;

    let history = sqlx::query_as::<_, PersistedMessageRow>(
        "SELECT id, session_id, query, response, created_at FROM chat_messages \
         WHERE session_id = $1 ORDER BY created_at DESC LIMIT 5",
    )
    .bind(session.id)
    .fetch_all(&worker.db)
    .await?
    .into_iter()
    .rev()
    .map(Into::into)
    .collect();

    let visitor = sqlx::query_as::<_, VisitorRow>(
        "SELECT id, bot_id, client_ip, name, email, phone, address, lead_score, \
         is_new, created_at FROM visitors WHERE id = $1",
    )
    .bind(session.visitor_id)
    .fetch_one(&worker.db)
    .await?;

    let bot = sqlx::query_as::<_, BotRow>(
        "SELECT display_config, description FROM bots WHERE id = $1",
    )
    .bind(bot_id)
    .fetch_one(&worker.db)
    .await?;

    Ok(ChatState {
        task_id,
        bot_id,
        session_token: session_token.to_string(),
        query,
        streaming,
        history,
        visitor: visitor.into(),
        long_term_memory: session.long_term_memory,
        bot_name: bot
            .display_config
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or("Assistant")
            .to_string(),
        bot_description: bot.description.unwrap_or_default(),
        assembled_system_prompt: String::new(),
        selected_key_index: None,
        latency_breakdown_ms: Default::default(),
        reflection: None,
        retrieved: vec![],
        retrieval_stage: None,
        response: String::new(),
        tokens_input: 0,
        tokens_output: 0,
        cost_usd: 0.0,
        is_contact: session.is_contact,
    })
}

async fn post_completion_webhook(url: &str, secret: &str, outcome: &graph::TurnOutcome) {
    let payload = ChatCompletionPayload {
        session_token: outcome.session_token.clone(),
        bot_id: outcome.bot_id,
        visitor_id: outcome.visitor_id,
        query: outcome.query.clone(),
        response: outcome.response.clone(),
        tokens_input: outcome.tokens_input as i32,
        tokens_output: outcome.tokens_output as i32,
        cost_usd: outcome.cost_usd,
        extracted_info: outcome.extracted_info.clone(),
        long_term_memory: outcome.long_term_memory.clone().unwrap_or_default(),
        is_contact: outcome.is_contact,
        sources: outcome.sources.clone(),
    };
    let body = match serde_json::to_vec(&payload) {
        Ok(b) => b,
        Err(err) => {
            error!(%err, "failed to serialize chat completion webhook");
            return;
        }
    };
    let Ok(signature) = webhook::sign(secret, &body) else {
        error!("failed to sign chat completion webhook");
        return;
    };

    let client = reqwest::Client::new();
    let mut delay = Duration::from_millis(500);
    for attempt in 0..5 {
        let result = client
            .post(url)
            .header(webhook::SIGNATURE_HEADER, &signature)
            .body(body.clone())
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => return,
            _ if attempt < 4 => {
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            _ => {
                warn!("chat completion webhook delivery failed after retries");
            }
        }
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: uuid::Uuid,
    visitor_id: uuid::Uuid,
    long_term_memory: Option<String>,
    is_contact: bool,
}

#[derive(sqlx::FromRow)]
struct PersistedMessageRow {
    id: uuid::Uuid,
    session_id: uuid::Uuid,
    query: String,
    response: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<PersistedMessageRow> for PersistedMessage {
    fn from(row: PersistedMessageRow) -> Self {
        Self {
            id: row.id,
            session_id: row.session_id,
            query: row.query,
            response: row.response,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct VisitorRow {
    id: uuid::Uuid,
    bot_id: uuid::Uuid,
    client_ip: String,
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    lead_score: Option<f32>,
    is_new: bool,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<VisitorRow> for Visitor {
    fn from(row: VisitorRow) -> Self {
        Self {
            id: row.id,
            bot_id: row.bot_id,
            client_ip: row.client_ip,
            name: row.name,
            email: row.email,
            phone: row.phone,
            address: row.address,
            lead_score: row.lead_score,
            lead_category: None,
            assessment: None,
            is_new: row.is_new,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BotRow {
    display_config: serde_json::Value,
    description: Option<String>,
}
