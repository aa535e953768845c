//! Shared components for the conveyor gateway and worker processes:
//! configuration, logging, the error taxonomy, resilience primitives, the
//! message bus, the Redis-backed key-value substrate, persisted domain
//! types, webhook signing, credential encryption, and the LLM/retrieval
//! provider abstractions.

pub mod config;
pub mod crypto;
pub mod domain;
pub mod errors;
pub mod kv;
pub mod llm;
pub mod logging;
pub mod messaging;
pub mod object_store;
pub mod resilience;
pub mod retrieval;
pub mod webhook;
pub mod webhook_payloads;
