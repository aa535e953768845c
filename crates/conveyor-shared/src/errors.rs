//! Shared error taxonomy for the gateway and every worker process.

use thiserror::Error;

/// Result alias used throughout the conveyor crates.
pub type ConveyorResult<T> = Result<T, ConveyorError>;

/// Errors common to the gateway, chat worker, ingest worker, and scoring worker.
#[derive(Debug, Error)]
pub enum ConveyorError {
    #[error("message bus error: {0}")]
    Bus(String),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("webhook delivery failed: {0}")]
    Webhook(String),

    #[error("encryption error: {0}")]
    Crypto(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("lock already held: {resource}")]
    AlreadyRunning { resource: String },

    #[error("all provider keys exhausted for bot {bot_id}")]
    AllKeysExhausted { bot_id: String },

    #[error("task not found: {task_id}")]
    TaskNotFound { task_id: String },

    #[error("upstream LLM request failed: {0}")]
    LlmProvider(String),

    #[error("upstream vector store request failed: {0}")]
    VectorStore(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ConveyorError {
    pub fn bus(msg: impl Into<String>) -> Self {
        Self::Bus(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn crypto(msg: impl Into<String>) -> Self {
        Self::Crypto(msg.into())
    }

    /// Whether the consumer loop should retry the task or route it to the DLQ.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            ConveyorError::Bus(_) => true,
            ConveyorError::Redis(_) => true,
            ConveyorError::Database(e) => matches!(e, sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)),
            ConveyorError::Webhook(_) => true,
            ConveyorError::LlmProvider(_) => true,
            ConveyorError::VectorStore(_) => true,
            ConveyorError::AllKeysExhausted { .. } => false,
            ConveyorError::AlreadyRunning { .. } => false,
            ConveyorError::TaskNotFound { .. } => false,
            ConveyorError::Validation(_) => false,
            ConveyorError::Config(_) => false,
            ConveyorError::Crypto(_) => false,
            ConveyorError::Serialization(_) => false,
            ConveyorError::Internal(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_errors_are_recoverable() {
        assert!(ConveyorError::bus("connection reset").is_recoverable());
    }

    #[test]
    fn exhausted_keys_are_not_recoverable() {
        let err = ConveyorError::AllKeysExhausted {
            bot_id: "bot-1".into(),
        };
        assert!(!err.is_recoverable());
    }

    #[test]
    fn validation_errors_are_not_recoverable() {
        assert!(!ConveyorError::validation("missing field").is_recoverable());
    }

    #[test]
    fn display_messages_are_readable() {
        let err = ConveyorError::AlreadyRunning {
            resource: "grading:visitor-1".into(),
        };
        assert_eq!(err.to_string(), "lock already held: grading:visitor-1");
    }
}
