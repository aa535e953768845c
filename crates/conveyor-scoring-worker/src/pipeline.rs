//! Shared grading/assessment pipeline (§4.7): load conversation context,
//! build a temporary per-session vector collection, retrieve + rerank per
//! evaluation question, judge with the LLM, report back.

use chrono::{DateTime, Utc};
use conveyor_shared::domain::{LeadCategory, ProviderConfig, Visitor};
use conveyor_shared::kv::{ProgressEvent, TaskStatus};
use conveyor_shared::llm::ChatMessage;
use conveyor_shared::retrieval::RetrievedChunk;
use conveyor_shared::webhook_payloads::{AssessmentWebhook, GradingWebhook};
use serde::Deserialize;
use tracing::{error, warn};
use uuid::Uuid;

use crate::credential;
use crate::ScoringWorkerState;

const GRADING_QUESTIONS: &[&str] = &[
    "What product or service interest has the visitor expressed?",
    "Has the visitor indicated a budget or purchase timeline?",
    "Has the visitor asked about pricing or requested a quote?",
    "What level of urgency or buying intent does the visitor show?",
    "Has the visitor volunteered contact information or asked to be contacted?",
];

const SUMMARY_QUESTION: &str = "Summarize this visitor's conversation history.";
const MAX_RATE_LIMIT_RETRIES: u32 = 2;

struct VisitorContext {
    visitor: Visitor,
    bot_name: String,
    assessment_questions: Vec<String>,
    provider: ProviderConfig,
    session_id: Uuid,
    messages: Vec<ConversationTurn>,
}

struct ConversationTurn {
    role: &'static str,
    content: String,
}

pub async fn run_grading(
    worker: &ScoringWorkerState,
    gateway_url: &str,
    webhook_secret: &str,
    task_id: Uuid,
    bot_id: Uuid,
    visitor_id: Uuid,
) {
    worker
        .kv
        .publish_progress(&ProgressEvent::new(task_id, TaskStatus::Processing, 5))
        .await
        .ok();

    let ctx = match load_visitor_context(worker, bot_id, visitor_id).await {
        Ok(ctx) => ctx,
        Err(err) => {
            warn!(%err, visitor_id = %visitor_id, "grading aborted");
            fail(worker, task_id, &err).await;
            return;
        }
    };

    let collection = collection_name("grading", ctx.session_id);
    if let Err(err) = embed_and_insert(worker, &collection, &ctx.messages).await {
        error!(%err, "failed to build grading collection");
        fail(worker, task_id, &err).await;
        return;
    }

    let questions: Vec<String> = GRADING_QUESTIONS.iter().map(|q| q.to_string()).collect();
    let retrieved = retrieve_for_questions(worker, &collection, &questions).await;
    worker.vector_store.drop_collection(&collection).await.ok();

    worker
        .kv
        .publish_progress(&ProgressEvent::new(task_id, TaskStatus::Processing, 70))
        .await
        .ok();

    let context = aggregate_context(&retrieved);
    let result = match judge_grading(worker, &ctx, &context).await {
        Ok(result) => result,
        Err(err) => {
            warn!(%err, "grading LLM judgement failed, reporting neutral result");
            RawScoring::default()
        }
    };

    let score = result.score.unwrap_or(0.0);
    let category = LeadCategory::from_score(
        score,
        worker.config.scoring.hot_threshold,
        worker.config.scoring.warm_threshold,
    );

    crate::webhook::post(
        &reqwest::Client::new(),
        gateway_url,
        "/webhooks/grading",
        webhook_secret,
        &GradingWebhook {
            task_id,
            visitor_id,
            score,
            intent_signals: result.intent_signals.unwrap_or_default(),
            engagement_level: result.engagement_level.unwrap_or_else(|| "low".into()),
            key_interests: result.key_interests.unwrap_or_default(),
            recommended_actions: result.recommended_actions.unwrap_or_default(),
            reasoning: result.reasoning.unwrap_or_default(),
        },
    )
    .await;

    worker
        .kv
        .publish_progress(&ProgressEvent::new(task_id, TaskStatus::Completed, 100))
        .await
        .ok();
    tracing::info!(task_id = %task_id, visitor_id = %visitor_id, score, category = ?category, "grading finished");
}

pub async fn run_assessment(
    worker: &ScoringWorkerState,
    gateway_url: &str,
    webhook_secret: &str,
    task_id: Uuid,
    bot_id: Uuid,
    visitor_id: Uuid,
) {
    worker
        .kv
        .publish_progress(&ProgressEvent::new(task_id, TaskStatus::Processing, 5))
        .await
        .ok();

    let ctx = match load_visitor_context(worker, bot_id, visitor_id).await {
        Ok(ctx) => ctx,
        Err(err) => {
            warn!(%err, visitor_id = %visitor_id, "assessment aborted");
            fail(worker, task_id, &err).await;
            return;
        }
    };

    if ctx.assessment_questions.is_empty() {
        fail(worker, task_id, "no assessment questions configured").await;
        return;
    }

    let collection = collection_name("assessment", ctx.session_id);
    if let Err(err) = embed_and_insert(worker, &collection, &ctx.messages).await {
        error!(%err, "failed to build assessment collection");
        fail(worker, task_id, &err).await;
        return;
    }

    let mut questions = vec![SUMMARY_QUESTION.to_string()];
    questions.extend(ctx.assessment_questions.clone());

    let retrieved = retrieve_for_questions(worker, &collection, &questions).await;
    worker.vector_store.drop_collection(&collection).await.ok();

    worker
        .kv
        .publish_progress(&ProgressEvent::new(task_id, TaskStatus::Processing, 70))
        .await
        .ok();

    let context = aggregate_context(&retrieved);
    let result = match judge_assessment(worker, &ctx, &context).await {
        Ok(result) => result,
        Err(err) => {
            warn!(%err, "assessment LLM judgement failed, reporting empty result");
            RawAssessment::default()
        }
    };

    crate::webhook::post(
        &reqwest::Client::new(),
        gateway_url,
        "/webhooks/assessment",
        webhook_secret,
        &AssessmentWebhook {
            task_id,
            visitor_id,
            results: result.results.unwrap_or_default(),
            summary: result.summary.unwrap_or_default(),
            lead_score: result.lead_score.unwrap_or(0.0),
        },
    )
    .await;

    worker
        .kv
        .publish_progress(&ProgressEvent::new(task_id, TaskStatus::Completed, 100))
        .await
        .ok();
    tracing::info!(task_id = %task_id, visitor_id = %visitor_id, "assessment finished");
}

async fn fail(worker: &ScoringWorkerState, task_id: Uuid, reason: &str) {
    let mut event = ProgressEvent::new(task_id, TaskStatus::Failed, 100);
    event.error = Some(reason.to_string());
    worker.kv.publish_progress(&event).await.ok();
}

fn collection_name(task_type: &str, session_id: Uuid) -> String {
    format!("{task_type}_{}", session_id.simple())
}

async fn embed_and_insert(
    worker: &ScoringWorkerState,
    collection: &str,
    messages: &[ConversationTurn],
) -> Result<(), String> {
    if messages.is_empty() {
        return Err("no messages to grade".into());
    }
    let chunks: Vec<RetrievedChunk> = messages
        .iter()
        .enumerate()
        .map(|(i, turn)| RetrievedChunk {
            text: turn.content.clone(),
            document_id: format!("msg_{i}"),
            web_url: None,
            chunk_index: i as i64,
            score: 0.0,
            metadata: serde_json::json!({ "role": turn.role }),
        })
        .collect();
    worker.vector_store.insert(collection, &chunks).await
}

async fn retrieve_for_questions(
    worker: &ScoringWorkerState,
    collection: &str,
    questions: &[String],
) -> Vec<(String, Vec<RetrievedChunk>)> {
    let top_k = worker.config.retrieval.stage1_top_k;
    let rerank_n = worker.config.retrieval.stage1_rerank_n;
    let mut results = Vec::with_capacity(questions.len());

    for question in questions {
        let hits = match worker.embedder.embed(question).await {
            Ok(vector) => conveyor_shared::retrieval::search_with_timeout(async {
                let hits = worker.vector_store.search(collection, &vector, top_k).await?;
                worker.reranker.rerank(question, hits, rerank_n).await
            })
            .await,
            Err(_) => Vec::new(),
        };
        results.push((question.clone(), hits));
    }
    results
}

fn aggregate_context(retrieved: &[(String, Vec<RetrievedChunk>)]) -> String {
    let mut parts = Vec::new();
    for (question, chunks) in retrieved {
        parts.push(format!("## {question}"));
        if chunks.is_empty() {
            parts.push("- (no relevant conversation found)".into());
        } else {
            for (i, chunk) in chunks.iter().enumerate() {
                let role = chunk
                    .metadata
                    .get("role")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown");
                parts.push(format!(
                    "{}. [{}] {} (relevance: {:.3})",
                    i + 1,
                    role.to_uppercase(),
                    chunk.text,
                    chunk.score
                ));
            }
        }
        parts.push(String::new());
    }
    parts.join("\n")
}

async fn load_visitor_context(
    worker: &ScoringWorkerState,
    bot_id: Uuid,
    visitor_id: Uuid,
) -> Result<VisitorContext, String> {
    let visitor = sqlx::query_as::<_, VisitorRow>(
        "SELECT id, bot_id, client_ip, name, email, phone, address, lead_score, \
         is_new, created_at FROM visitors WHERE id = $1",
    )
    .bind(visitor_id)
    .fetch_one(&worker.db)
    .await
    .map_err(|e| e.to_string())?;

    let bot = sqlx::query_as::<_, BotRow>(
        "SELECT display_config, assessment_questions FROM bots WHERE id = $1",
    )
    .bind(bot_id)
    .fetch_one(&worker.db)
    .await
    .map_err(|e| e.to_string())?;

    let provider = sqlx::query_as::<_, ProviderConfigRow>(
        "SELECT pc.id, pc.bot_id, pc.provider, pc.model, pc.credentials, pc.tuning_params \
         FROM provider_configs pc JOIN bots b ON b.provider_config_id = pc.id WHERE b.id = $1",
    )
    .bind(bot_id)
    .fetch_one(&worker.db)
    .await
    .map_err(|e| e.to_string())?;

    let session = sqlx::query_as::<_, SessionRow>(
        "SELECT id FROM chat_sessions WHERE visitor_id = $1 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(visitor_id)
    .fetch_optional(&worker.db)
    .await
    .map_err(|e| e.to_string())?
    .ok_or_else(|| "no messages to grade".to_string())?;

    let rows = sqlx::query_as::<_, MessageRow>(
        "SELECT query, response, created_at FROM chat_messages \
         WHERE session_id = $1 ORDER BY created_at ASC",
    )
    .bind(session.id)
    .fetch_all(&worker.db)
    .await
    .map_err(|e| e.to_string())?;

    if rows.is_empty() {
        return Err("no messages to grade".into());
    }

    let mut messages = Vec::with_capacity(rows.len() * 2);
    for row in rows {
        messages.push(ConversationTurn {
            role: "user",
            content: row.query,
        });
        messages.push(ConversationTurn {
            role: "assistant",
            content: row.response,
        });
    }

    Ok(VisitorContext {
        visitor: visitor.into(),
        bot_name: bot
            .display_config
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or("Assistant")
            .to_string(),
        assessment_questions: bot.assessment_questions,
        provider: provider.into(),
        session_id: session.id,
        messages,
    })
}

async fn judge_grading(
    worker: &ScoringWorkerState,
    ctx: &VisitorContext,
    context: &str,
) -> Result<RawScoring, String> {
    let system = "You are a B2B lead scoring assistant. Given conversation context organized \
                  by evaluation question, return strict JSON with keys score (0-100), \
                  intent_signals, engagement_level, key_interests, recommended_actions, reasoning."
        .to_string();
    let user = format!(
        "Visitor profile: name={:?} email={:?}\nBot: {}\n\n{context}",
        ctx.visitor.name, ctx.visitor.email, ctx.bot_name
    );
    let raw = call_llm(worker, ctx, system, user).await?;
    Ok(serde_json::from_str(&raw).unwrap_or_default())
}

async fn judge_assessment(
    worker: &ScoringWorkerState,
    ctx: &VisitorContext,
    context: &str,
) -> Result<RawAssessment, String> {
    let system = "You are a visitor assessment assistant. Given conversation context organized \
                  by evaluation question, return strict JSON with keys results (array of \
                  {question, answer}), summary, lead_score (0-100)."
        .to_string();
    let user = format!(
        "Visitor profile: name={:?} email={:?}\nBot: {}\n\n{context}",
        ctx.visitor.name, ctx.visitor.email, ctx.bot_name
    );
    let raw = call_llm(worker, ctx, system, user).await?;
    Ok(serde_json::from_str(&raw).unwrap_or_default())
}

async fn call_llm(
    worker: &ScoringWorkerState,
    ctx: &VisitorContext,
    system: String,
    user: String,
) -> Result<String, String> {
    let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];
    let mut attempts = 0;
    loop {
        let selected = credential::select(worker, ctx.visitor.bot_id, &ctx.provider)
            .await
            .map_err(|e| e.to_string())?;

        match worker
            .llm
            .complete(&selected.key, &ctx.provider.model, &messages)
            .await
        {
            Ok(response) => return Ok(response.content),
            Err(conveyor_shared::llm::LlmError::RateLimited) => {
                attempts += 1;
                if attempts > MAX_RATE_LIMIT_RETRIES {
                    return Err("rate limited".into());
                }
            }
            Err(err) => return Err(err.to_string()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawScoring {
    #[serde(default)]
    score: Option<f32>,
    #[serde(default)]
    intent_signals: Option<Vec<String>>,
    #[serde(default)]
    engagement_level: Option<String>,
    #[serde(default)]
    key_interests: Option<Vec<String>>,
    #[serde(default)]
    recommended_actions: Option<Vec<String>>,
    #[serde(default)]
    reasoning: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAssessment {
    #[serde(default)]
    results: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    lead_score: Option<f32>,
}

#[derive(sqlx::FromRow)]
struct VisitorRow {
    id: Uuid,
    bot_id: Uuid,
    client_ip: String,
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    lead_score: Option<f32>,
    is_new: bool,
    created_at: DateTime<Utc>,
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
    assessment_questions: Vec<String>,
}

#[derive(sqlx::FromRow)]
struct ProviderConfigRow {
    id: Uuid,
    bot_id: Uuid,
    provider: String,
    model: String,
    credentials: serde_json::Value,
    tuning_params: serde_json::Value,
}

impl From<ProviderConfigRow> for ProviderConfig {
    fn from(row: ProviderConfigRow) -> Self {
        Self {
            id: row.id,
            bot_id: row.bot_id,
            provider: row.provider,
            model: row.model,
            credentials: serde_json::from_value(row.credentials).unwrap_or_default(),
            tuning_params: row.tuning_params,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    query: String,
    response: String,
    #[allow(dead_code)]
    created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_context_marks_empty_question() {
        let retrieved = vec![("Q1".to_string(), vec![])];
        let context = aggregate_context(&retrieved);
        assert!(context.contains("## Q1"));
        assert!(context.contains("no relevant conversation found"));
    }

    #[test]
    fn aggregate_context_includes_role_and_score() {
        let chunk = RetrievedChunk {
            text: "hello".into(),
            document_id: "msg_0".into(),
            web_url: None,
            chunk_index: 0,
            score: 0.87,
            metadata: serde_json::json!({"role": "user"}),
        };
        let retrieved = vec![("Q1".to_string(), vec![chunk])];
        let context = aggregate_context(&retrieved);
        assert!(context.contains("[USER] hello"));
        assert!(context.contains("0.870"));
    }

    #[test]
    fn collection_name_is_hyphen_free() {
        let id = Uuid::new_v4();
        let name = collection_name("grading", id);
        assert!(name.starts_with("grading_"));
        assert!(!name.contains('-'));
    }
}
