//! Persisted domain entities owned exclusively by the gateway.
//!
//! Workers never write these rows directly (§9 "webhook vs direct
//! persistence" of the orchestration design) — they post results back to the
//! gateway over HTTP webhooks, and the gateway is the sole `sqlx` writer.

mod bot;
mod chat;
mod document;
mod visitor;

pub use bot::{AllowedOrigin, Bot, BotStatus, CredentialEntry, ProviderConfig};
pub use chat::{ChatMessage, ChatSession, ChatSessionStatus};
pub use document::{Document, DocumentSource, DocumentStatus};
pub use visitor::{ExtractedVisitorInfo, LeadCategory, Visitor};
