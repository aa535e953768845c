use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DocumentSource {
    Url(String),
    UploadedFile { filename: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub bot_id: Uuid,
    pub source: DocumentSource,
    pub status: DocumentStatus,
    pub content_hash: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Deduplication key per §8: at most one `Document` row per `(bot_id, content_hash)`.
    pub fn content_hash(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_deterministic() {
        let a = Document::content_hash(b"hello world");
        let b = Document::content_hash(b"hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn content_hash_differs_for_different_content() {
        assert_ne!(
            Document::content_hash(b"hello"),
            Document::content_hash(b"world")
        );
    }
}
