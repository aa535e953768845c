//! Vector store, embedder, and reranker abstractions backing the chat
//! graph's adaptive two-stage retrieval (§4.5.3) and the ingest/scoring
//! workers' collection management (§4.6, §4.7).

use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub document_id: String,
    pub web_url: Option<String>,
    pub chunk_index: i64,
    pub score: f32,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetrievalStage {
    Stage1,
    Stage2,
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String>;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String>;
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, String>;

    async fn insert(&self, collection: &str, chunks: &[RetrievedChunk]) -> Result<(), String>;

    async fn delete_by_document(&self, collection: &str, document_id: &str) -> Result<(), String>;

    async fn flush(&self, collection: &str) -> Result<(), String>;

    async fn drop_collection(&self, collection: &str) -> Result<(), String>;
}

#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(
        &self,
        query: &str,
        chunks: Vec<RetrievedChunk>,
        top_n: usize,
    ) -> Result<Vec<RetrievedChunk>, String>;
}

/// Parameters for [`two_stage_retrieve`].
#[derive(Debug, Clone, Copy)]
pub struct TwoStageParams {
    pub stage1_top_k: usize,
    pub stage1_rerank_n: usize,
    pub stage2_top_k: usize,
    pub stage2_rerank_n: usize,
    pub confidence_threshold: f32,
    pub two_stage_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub chunks: Vec<RetrievedChunk>,
    pub stage: RetrievalStage,
}

/// 5-minute result cache keyed on `(collection, query_text, top_k, filter)`;
/// writes only happen for non-empty results (§4.5.3).
#[derive(Clone)]
pub struct RetrievalCache {
    cache: Cache<String, Vec<RetrievedChunk>>,
}

impl RetrievalCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            cache: Cache::builder()
                .time_to_live(Duration::from_secs(ttl_secs))
                .max_capacity(10_000)
                .build(),
        }
    }

    pub fn key(collection: &str, query_text: &str, top_k: usize, filter: Option<&str>) -> String {
        format!("{collection}|{query_text}|{top_k}|{}", filter.unwrap_or(""))
    }

    pub async fn get(&self, key: &str) -> Option<Vec<RetrievedChunk>> {
        self.cache.get(key).await
    }

    pub async fn put(&self, key: String, chunks: Vec<RetrievedChunk>) {
        if !chunks.is_empty() {
            self.cache.insert(key, chunks).await;
        }
    }
}

/// Mean of the rerank scores, used to decide whether stage-1 results are
/// confident enough or stage-2 should run (§4.5.3).
pub fn mean_score(chunks: &[RetrievedChunk]) -> f32 {
    if chunks.is_empty() {
        return 0.0;
    }
    chunks.iter().map(|c| c.score).sum::<f32>() / chunks.len() as f32
}

/// Per-search wall-clock timeout is 5s; on timeout or failure, degrade to
/// empty results rather than failing the node (§4.5.3).
pub async fn search_with_timeout<F, T>(fut: F) -> Vec<T>
where
    F: std::future::Future<Output = Result<Vec<T>, String>>,
{
    match tokio::time::timeout(Duration::from_secs(5), fut).await {
        Ok(Ok(results)) => results,
        Ok(Err(_)) | Err(_) => Vec::new(),
    }
}

/// HTTP-backed embedder speaking a minimal `{"text": ...} -> {"vector": [...]}`
/// protocol. Exact wire format is intentionally unspecified beyond what the
/// retrieval layer needs (§1 Non-goals), mirroring [`crate::llm::HttpLlmProvider`].
pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEmbedder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String> {
        self.embed_batch(std::slice::from_ref(&text.to_string()))
            .await
            .map(|mut v| v.pop().unwrap_or_default())
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String> {
        #[derive(Deserialize)]
        struct Response {
            vectors: Vec<Vec<f32>>,
        }
        let resp = self
            .client
            .post(format!("{}/embed", self.base_url))
            .json(&serde_json::json!({ "texts": texts }))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        resp.json::<Response>()
            .await
            .map(|r| r.vectors)
            .map_err(|e| e.to_string())
    }
}

/// HTTP-backed vector store client, shaped for a Qdrant-like collection API.
pub struct HttpVectorStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpVectorStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl VectorStore for HttpVectorStore {
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, String> {
        #[derive(Deserialize)]
        struct Response {
            results: Vec<RetrievedChunk>,
        }
        let resp = self
            .client
            .post(format!("{}/collections/{collection}/search", self.base_url))
            .json(&serde_json::json!({ "vector": vector, "top_k": top_k }))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        resp.json::<Response>()
            .await
            .map(|r| r.results)
            .map_err(|e| e.to_string())
    }

    async fn insert(&self, collection: &str, chunks: &[RetrievedChunk]) -> Result<(), String> {
        self.client
            .post(format!("{}/collections/{collection}/upsert", self.base_url))
            .json(&serde_json::json!({ "chunks": chunks }))
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    async fn delete_by_document(&self, collection: &str, document_id: &str) -> Result<(), String> {
        self.client
            .post(format!("{}/collections/{collection}/delete", self.base_url))
            .json(&serde_json::json!({ "document_id": document_id }))
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    async fn flush(&self, collection: &str) -> Result<(), String> {
        self.client
            .post(format!("{}/collections/{collection}/flush", self.base_url))
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    async fn drop_collection(&self, collection: &str) -> Result<(), String> {
        self.client
            .delete(format!("{}/collections/{collection}", self.base_url))
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

/// HTTP-backed cross-encoder reranker.
pub struct HttpReranker {
    client: reqwest::Client,
    base_url: String,
}

impl HttpReranker {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(
        &self,
        query: &str,
        chunks: Vec<RetrievedChunk>,
        top_n: usize,
    ) -> Result<Vec<RetrievedChunk>, String> {
        #[derive(Deserialize)]
        struct Response {
            results: Vec<RetrievedChunk>,
        }
        let resp = self
            .client
            .post(format!("{}/rerank", self.base_url))
            .json(&serde_json::json!({ "query": query, "chunks": chunks, "top_n": top_n }))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        resp.json::<Response>()
            .await
            .map(|r| r.results)
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(score: f32) -> RetrievedChunk {
        RetrievedChunk {
            text: "text".into(),
            document_id: "doc-1".into(),
            web_url: None,
            chunk_index: 0,
            score,
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn mean_score_of_empty_is_zero() {
        assert_eq!(mean_score(&[]), 0.0);
    }

    #[test]
    fn mean_score_averages_correctly() {
        let chunks = vec![chunk(0.8), chunk(0.6), chunk(1.0)];
        assert!((mean_score(&chunks) - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn cache_skips_writing_empty_results() {
        let cache = RetrievalCache::new(300);
        let key = RetrievalCache::key("bot_1", "hours", 10, None);
        cache.put(key.clone(), vec![]).await;
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn cache_roundtrips_non_empty_results() {
        let cache = RetrievalCache::new(300);
        let key = RetrievalCache::key("bot_1", "hours", 10, None);
        cache.put(key.clone(), vec![chunk(0.9)]).await;
        let hit = cache.get(&key).await.unwrap();
        assert_eq!(hit.len(), 1);
    }

    #[tokio::test]
    async fn search_with_timeout_degrades_on_error() {
        let result: Vec<RetrievedChunk> =
            search_with_timeout(async { Err::<Vec<RetrievedChunk>, String>("boom".into()) })
                .await;
        assert!(result.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn search_with_timeout_degrades_on_timeout() {
        let result: Vec<RetrievedChunk> = search_with_timeout(async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(vec![chunk(1.0)])
        })
        .await;
        assert!(result.is_empty());
    }
}
