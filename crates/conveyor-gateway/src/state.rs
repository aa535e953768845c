//! Dependency-injected service container, built once at startup and torn
//! down at shutdown — no module-level mutable state (§9).

use std::sync::Arc;

use conveyor_shared::config::ConveyorConfig;
use conveyor_shared::crypto::CredentialCipher;
use conveyor_shared::kv::KvStore;
use conveyor_shared::messaging::MessageBus;
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub kv: KvStore,
    pub bus: MessageBus,
    pub config: Arc<ConveyorConfig>,
    pub credential_cipher: Arc<CredentialCipher>,
    pub webhook_secret: Arc<str>,
}

impl AppState {
    pub async fn bootstrap(config: ConveyorConfig) -> anyhow::Result<Self> {
        let database_url = config.resolve_secret(&config.database.url_env)?;
        let redis_url = config.resolve_secret(&config.redis.url_env)?;
        let amqp_url = config.resolve_secret(&config.bus.url_env)?;
        let webhook_secret = config.resolve_secret(&config.webhook.secret_env)?;
        let crypto_key_b64 = config.resolve_secret("CONVEYOR_CREDENTIAL_KEY")?;

        let db = PgPool::connect(&database_url).await?;
        let kv = KvStore::connect(&redis_url).await?;
        let bus = MessageBus::connect(&amqp_url).await?;

        let key_bytes = base64_decode(&crypto_key_b64)?;
        let cipher = CredentialCipher::from_key_bytes(&key_bytes)
            .map_err(|e| anyhow::anyhow!("invalid credential key: {e}"))?;

        Ok(Self {
            db,
            kv,
            bus,
            config: Arc::new(config),
            credential_cipher: Arc::new(cipher),
            webhook_secret: webhook_secret.into(),
        })
    }
}

fn base64_decode(s: &str) -> anyhow::Result<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .map_err(|e| anyhow::anyhow!("invalid base64: {e}"))
}
