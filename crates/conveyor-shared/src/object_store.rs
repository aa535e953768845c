//! Blob storage for original uploaded files, written once a file-upload
//! task finishes chunking and embedding (§4.6).

use async_trait::async_trait;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, String>;
}

/// HTTP-backed blob store speaking a minimal PUT-by-key protocol. Exact
/// wire format is intentionally unspecified beyond what ingest needs
/// (§1 Non-goals), mirroring [`crate::llm::HttpLlmProvider`].
pub struct HttpObjectStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, String> {
        let url = format!("{}/{key}", self.base_url);
        self.client
            .put(&url)
            .header("content-type", content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?;
        Ok(url)
    }
}
