//! Per-crate dependency container and the `ChatState` carried between graph nodes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use conveyor_shared::config::ConveyorConfig;
use conveyor_shared::crypto::CredentialCipher;
use conveyor_shared::domain::{ChatMessage as PersistedMessage, ExtractedVisitorInfo, Visitor};
use conveyor_shared::kv::KvStore;
use conveyor_shared::llm::{ChatMessage, HttpLlmProvider, LlmProvider};
use conveyor_shared::retrieval::{
    Embedder, HttpEmbedder, HttpReranker, HttpVectorStore, Reranker, RetrievalCache,
    RetrievedChunk, VectorStore,
};
use sqlx::PgPool;
use uuid::Uuid;

/// Dependency-injected container shared by every node and the consumer loop.
#[derive(Clone)]
pub struct ChatWorkerState {
    pub db: PgPool,
    pub kv: KvStore,
    pub config: Arc<ConveyorConfig>,
    pub credential_cipher: Arc<CredentialCipher>,
    pub llm: Arc<dyn LlmProvider>,
    pub embedder: Arc<dyn Embedder>,
    pub vector_store: Arc<dyn VectorStore>,
    pub reranker: Arc<dyn Reranker>,
    pub retrieval_cache: RetrievalCache,
}

impl ChatWorkerState {
    pub fn generate_timeout(&self) -> Duration {
        Duration::from_secs(60)
    }

    pub async fn bootstrap(config: ConveyorConfig) -> anyhow::Result<Self> {
        let database_url = config.resolve_secret(&config.database.url_env)?;
        let redis_url = config.resolve_secret(&config.redis.url_env)?;
        let crypto_key_b64 = config.resolve_secret("CONVEYOR_CREDENTIAL_KEY")?;
        let llm_base_url = std::env::var("CONVEYOR_LLM_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:11434".into());
        let embedder_url = std::env::var("CONVEYOR_EMBEDDER_URL")
            .unwrap_or_else(|_| "http://localhost:8081".into());
        let vector_store_url = std::env::var("CONVEYOR_VECTOR_STORE_URL")
            .unwrap_or_else(|_| "http://localhost:6333".into());
        let reranker_url = std::env::var("CONVEYOR_RERANKER_URL")
            .unwrap_or_else(|_| "http://localhost:8082".into());

        let db = PgPool::connect(&database_url).await?;
        let kv = KvStore::connect(&redis_url).await?;

        let key_bytes = base64_decode(&crypto_key_b64)?;
        let cipher = CredentialCipher::from_key_bytes(&key_bytes)
            .map_err(|e| anyhow::anyhow!("invalid credential key: {e}"))?;

        let retrieval_cache = RetrievalCache::new(config.retrieval.cache_ttl_secs);

        Ok(Self {
            db,
            kv,
            credential_cipher: Arc::new(cipher),
            llm: Arc::new(HttpLlmProvider::new(llm_base_url)),
            embedder: Arc::new(HttpEmbedder::new(embedder_url)),
            vector_store: Arc::new(HttpVectorStore::new(vector_store_url)),
            reranker: Arc::new(HttpReranker::new(reranker_url)),
            retrieval_cache,
            config: Arc::new(config),
        })
    }
}

fn base64_decode(s: &str) -> anyhow::Result<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .map_err(|e| anyhow::anyhow!("invalid base64: {e}"))
}

/// Carried between every node in the chat graph (§4.5).
#[derive(Clone)]
pub struct ChatState {
    pub task_id: Uuid,
    pub bot_id: Uuid,
    pub session_token: String,
    pub query: String,
    pub streaming: bool,

    pub history: Vec<PersistedMessage>,
    pub visitor: Visitor,
    pub long_term_memory: Option<String>,
    pub bot_name: String,
    pub bot_description: String,
    pub assembled_system_prompt: String,

    pub selected_key_index: Option<usize>,
    pub latency_breakdown_ms: HashMap<&'static str, u64>,

    pub reflection: Option<Reflection>,
    pub retrieved: Vec<RetrievedChunk>,
    pub retrieval_stage: Option<&'static str>,
    pub response: String,
    pub tokens_input: u32,
    pub tokens_output: u32,
    pub cost_usd: f64,
    pub is_contact: bool,
}

impl ChatState {
    pub fn recent_turns(&self, n: usize) -> Vec<ChatMessage> {
        self.history
            .iter()
            .rev()
            .take(n)
            .rev()
            .flat_map(|m| {
                vec![
                    ChatMessage::user(m.query.clone()),
                    ChatMessage::assistant(m.response.clone()),
                ]
            })
            .collect()
    }
}

/// Structured output of the reflection node (§4.5.1).
#[derive(Debug, Clone)]
pub struct Reflection {
    pub language: String,
    pub confidence: f32,
    pub intent: Intent,
    pub needs_retrieval: bool,
    pub rewritten_query: String,
    pub followup_action: Option<String>,
    pub visitor_info: Option<ExtractedVisitorInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Chitchat,
    Question,
}

impl Reflection {
    /// Default applied on malformed JSON or an empty model response — the
    /// reflection node must never fail the turn (§4.5.1).
    pub fn fallback(query: &str) -> Self {
        Self {
            language: "default".into(),
            confidence: 0.0,
            intent: Intent::Question,
            needs_retrieval: true,
            rewritten_query: query.to_string(),
            followup_action: None,
            visitor_info: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn msg(query: &str, response: &str) -> PersistedMessage {
        PersistedMessage {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            query: query.into(),
            response: response.into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn fallback_reflection_always_needs_retrieval() {
        let r = Reflection::fallback("what are your hours");
        assert!(r.needs_retrieval);
        assert_eq!(r.intent, Intent::Question);
        assert_eq!(r.rewritten_query, "what are your hours");
    }

    #[test]
    fn recent_turns_flattens_query_response_pairs_in_order() {
        let state = ChatState {
            task_id: Uuid::new_v4(),
            bot_id: Uuid::new_v4(),
            session_token: "tok".into(),
            query: "hi".into(),
            streaming: false,
            history: vec![msg("q1", "a1"), msg("q2", "a2")],
            visitor: test_visitor(),
            long_term_memory: None,
            bot_name: "bot".into(),
            bot_description: String::new(),
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
        };
        let turns = state.recent_turns(2);
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[0].content, "q1");
        assert_eq!(turns[3].content, "a2");
    }

    fn test_visitor() -> Visitor {
        Visitor {
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
        }
    }
}
