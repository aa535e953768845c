//! Dependency-injected service container for the scoring worker.

use std::sync::Arc;

use conveyor_shared::config::ConveyorConfig;
use conveyor_shared::crypto::CredentialCipher;
use conveyor_shared::kv::KvStore;
use conveyor_shared::llm::{HttpLlmProvider, LlmProvider};
use conveyor_shared::retrieval::{
    Embedder, HttpEmbedder, HttpReranker, HttpVectorStore, Reranker, VectorStore,
};
use sqlx::PgPool;

#[derive(Clone)]
pub struct ScoringWorkerState {
    pub db: PgPool,
    pub kv: KvStore,
    pub config: Arc<ConveyorConfig>,
    pub credential_cipher: Arc<CredentialCipher>,
    pub llm: Arc<dyn LlmProvider>,
    pub embedder: Arc<dyn Embedder>,
    pub vector_store: Arc<dyn VectorStore>,
    pub reranker: Arc<dyn Reranker>,
}

impl ScoringWorkerState {
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

        Ok(Self {
            db,
            kv,
            credential_cipher: Arc::new(cipher),
            llm: Arc::new(HttpLlmProvider::new(llm_base_url)),
            embedder: Arc::new(HttpEmbedder::new(embedder_url)),
            vector_store: Arc::new(HttpVectorStore::new(vector_store_url)),
            reranker: Arc::new(HttpReranker::new(reranker_url)),
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
