//! Dependency-injected service container for the ingest worker.

use std::sync::Arc;

use conveyor_shared::config::ConveyorConfig;
use conveyor_shared::kv::KvStore;
use conveyor_shared::object_store::{HttpObjectStore, ObjectStore};
use conveyor_shared::retrieval::{HttpVectorStore, VectorStore};
use sqlx::PgPool;

/// No [`conveyor_shared::retrieval::Embedder`] handle here: this worker's
/// vector store embeds text server-side on insert (§4.6); only the chat
/// graph's retrieve node needs a client-side embedder for query vectors.
#[derive(Clone)]
pub struct IngestWorkerState {
    pub db: PgPool,
    pub kv: KvStore,
    pub config: Arc<ConveyorConfig>,
    pub vector_store: Arc<dyn VectorStore>,
    pub object_store: Arc<dyn ObjectStore>,
    pub http: reqwest::Client,
}

impl IngestWorkerState {
    pub async fn bootstrap(config: ConveyorConfig) -> anyhow::Result<Self> {
        let database_url = config.resolve_secret(&config.database.url_env)?;
        let redis_url = config.resolve_secret(&config.redis.url_env)?;
        let vector_store_url = std::env::var("CONVEYOR_VECTOR_STORE_URL")
            .unwrap_or_else(|_| "http://localhost:6333".into());
        let object_store_url = std::env::var("CONVEYOR_OBJECT_STORE_URL")
            .unwrap_or_else(|_| "http://localhost:9000".into());

        let db = PgPool::connect(&database_url).await?;
        let kv = KvStore::connect(&redis_url).await?;

        Ok(Self {
            db,
            kv,
            vector_store: Arc::new(HttpVectorStore::new(vector_store_url)),
            object_store: Arc::new(HttpObjectStore::new(object_store_url)),
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_millis(config.ingest.crawl_fetch_timeout_ms))
                .build()?,
            config: Arc::new(config),
        })
    }
}
