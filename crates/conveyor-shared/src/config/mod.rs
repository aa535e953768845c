//! Layered TOML + environment configuration.
//!
//! Loads `config/default.toml`, then `config/{environment}.toml`, then
//! environment variables prefixed `CONVEYOR__` with `__` as the nesting
//! separator (e.g. `CONVEYOR__REDIS__URL`).

mod circuit_breaker;

pub use circuit_breaker::CircuitBreakerComponentConfig;

use serde::Deserialize;
use std::time::Duration;

use crate::errors::{ConveyorError, ConveyorResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConveyorConfig {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub bus: BusConfig,
    pub webhook: WebhookConfig,
    pub key_rotation: KeyRotationConfig,
    pub retrieval: RetrievalConfig,
    pub groundedness: GroundednessConfig,
    pub scoring: ScoringConfig,
    pub ingest: IngestConfig,
    pub circuit_breaker: CircuitBreakerComponentConfig,
    pub shutdown_timeout_ms: u64,
}

impl Default for ConveyorConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            redis: RedisConfig::default(),
            bus: BusConfig::default(),
            webhook: WebhookConfig::default(),
            key_rotation: KeyRotationConfig::default(),
            retrieval: RetrievalConfig::default(),
            groundedness: GroundednessConfig::default(),
            scoring: ScoringConfig::default(),
            ingest: IngestConfig::default(),
            circuit_breaker: CircuitBreakerComponentConfig::default(),
            shutdown_timeout_ms: 30_000,
        }
    }
}

/// Ingest worker tunables (§4.6, §5).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub scratch_dir: String,
    pub max_crawl_pages: u32,
    pub max_concurrent_tasks: usize,
    pub vector_insert_batch_size: usize,
    pub crawl_fetch_timeout_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            scratch_dir: "/tmp/uploads".into(),
            max_crawl_pages: 500,
            max_concurrent_tasks: 4,
            vector_insert_batch_size: 1000,
            crawl_fetch_timeout_ms: 15_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url_env: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url_env: "CONVEYOR_DATABASE_URL".into(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url_env: String,
    pub task_state_ttl_secs: u64,
    pub lock_ttl_secs: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url_env: "CONVEYOR_REDIS_URL".into(),
            task_state_ttl_secs: 3600,
            lock_ttl_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub url_env: String,
    pub chat_queue: String,
    pub file_queue: String,
    pub grading_queue: String,
    pub prefetch: u16,
    pub max_priority: u8,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            url_env: "CONVEYOR_AMQP_URL".into(),
            chat_queue: "chat_processing_queue".into(),
            file_queue: "file_processing_queue".into(),
            grading_queue: "visitor_grading_queue".into(),
            prefetch: 10,
            max_priority: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub secret_env: String,
    pub timeout_ms: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret_env: "CONVEYOR_WEBHOOK_SECRET".into(),
            timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeyRotationConfig {
    pub cooldown_secs: u64,
    pub cooldown_buffer_secs: u64,
    pub retry_budget: u32,
    pub index_ttl_secs: u64,
}

impl Default for KeyRotationConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 60,
            cooldown_buffer_secs: 10,
            retry_budget: 2,
            index_ttl_secs: 3600,
        }
    }
}

/// Adaptive two-stage retrieval tunables (§4.5.3). Stage 2 widens the
/// search independently of stage 1 rather than as a fixed multiple of it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub stage1_top_k: usize,
    pub stage1_rerank_n: usize,
    pub confidence_threshold: f32,
    pub stage2_top_k: usize,
    pub stage2_rerank_n: usize,
    pub cache_ttl_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            stage1_top_k: 20,
            stage1_rerank_n: 5,
            confidence_threshold: 0.6,
            stage2_top_k: 40,
            stage2_rerank_n: 10,
            cache_ttl_secs: 300,
        }
    }
}

/// Post-generation groundedness check (§4.5.4): optional, off by default.
/// When enabled, a judge prompt scores the response against the retrieved
/// context on 0/1/2 and regenerates a stricter answer while below threshold.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GroundednessConfig {
    pub enabled: bool,
    pub max_loops: u32,
    pub threshold: u8,
}

impl Default for GroundednessConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_loops: 2,
            threshold: 1,
        }
    }
}

/// Lead-scoring thresholds (§4.7): `hot >= hot_threshold`,
/// `warm >= warm_threshold`, else `cold`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub hot_threshold: f32,
    pub warm_threshold: f32,
    pub grading_lock_ttl_secs: i64,
    pub assessment_lock_ttl_secs: i64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            hot_threshold: 80.0,
            warm_threshold: 50.0,
            grading_lock_ttl_secs: 300,
            assessment_lock_ttl_secs: 300,
        }
    }
}

impl ConveyorConfig {
    /// Load configuration by layering `config/default.toml`, an optional
    /// `config/{environment}.toml`, and `CONVEYOR__`-prefixed environment
    /// variables, in that order.
    pub fn load(environment: &str) -> ConveyorResult<Self> {
        dotenvy::dotenv().ok();

        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(
                config::File::with_name(&format!("config/{environment}")).required(false),
            )
            .add_source(
                config::Environment::with_prefix("CONVEYOR")
                    .separator("__")
                    .try_parsing(true),
            );

        let raw = builder
            .build()
            .map_err(|e| ConveyorError::config(e.to_string()))?;

        raw.try_deserialize()
            .map_err(|e| ConveyorError::config(e.to_string()))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Resolve a secret from the environment variable this config section names.
    pub fn resolve_secret(&self, env_var: &str) -> ConveyorResult<String> {
        std::env::var(env_var)
            .map_err(|_| ConveyorError::config(format!("missing required env var {env_var}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = ConveyorConfig::default();
        assert_eq!(cfg.bus.chat_queue, "chat_processing_queue");
        assert_eq!(cfg.key_rotation.cooldown_secs, 60);
        assert_eq!(cfg.shutdown_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn load_falls_back_to_defaults_when_no_files_present() {
        let cfg = ConveyorConfig::load("test").expect("defaults should still deserialize");
        assert_eq!(cfg.retrieval.stage1_top_k, 20);
    }
}
