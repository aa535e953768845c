//! Decrypts the selected credential at the moment of use; decrypted
//! material is never logged or cached (§4.4).

use conveyor_shared::crypto::CredentialCipher;
use conveyor_shared::domain::ProviderConfig;
use conveyor_shared::errors::{ConveyorError, ConveyorResult};
use conveyor_shared::kv::{KeyRotationService, KvStore};
use conveyor_shared::llm::ApiKey;
use uuid::Uuid;

use crate::ChatWorkerState;

pub struct SelectedCredential {
    pub key: ApiKey,
    pub index: usize,
}

/// Convenience wrapper over `select_credential` for nodes that only have a
/// `ChatWorkerState` and a bot id on hand (reflection, memory, generate).
pub async fn select_for_bot(
    worker: &ChatWorkerState,
    bot_id: Uuid,
    provider: &ProviderConfig,
) -> ConveyorResult<SelectedCredential> {
    select_credential(
        &worker.kv,
        &worker.credential_cipher,
        bot_id,
        provider,
        worker.config.key_rotation.cooldown_secs,
        worker.config.key_rotation.cooldown_buffer_secs,
        worker.config.key_rotation.index_ttl_secs,
    )
    .await
}

pub async fn select_credential(
    kv: &KvStore,
    cipher: &CredentialCipher,
    bot_id: Uuid,
    provider: &ProviderConfig,
    cooldown_secs: u64,
    cooldown_buffer_secs: u64,
    index_ttl_secs: u64,
) -> ConveyorResult<SelectedCredential> {
    let active: Vec<_> = provider.active_credentials().collect();
    let rotation = KeyRotationService::new(kv, cooldown_secs, cooldown_buffer_secs, index_ttl_secs);
    let selected = rotation.select(bot_id, active.len()).await?;
    let entry = active.get(selected.index).ok_or_else(|| {
        ConveyorError::AllKeysExhausted {
            bot_id: bot_id.to_string(),
        }
    })?;
    let plaintext = cipher.decrypt_to_string(&entry.ciphertext).map_err(|e| {
        ConveyorError::crypto(e.to_string())
    })?;
    Ok(SelectedCredential {
        key: ApiKey(plaintext),
        index: selected.index,
    })
}

pub async fn record_usage(kv: &KvStore, bot_id: Uuid, idx: usize) -> ConveyorResult<()> {
    KeyRotationService::new(kv, 60, 10, 3600)
        .record_usage(bot_id, idx)
        .await
}

pub async fn record_rate_limit(kv: &KvStore, bot_id: Uuid, idx: usize) -> ConveyorResult<()> {
    KeyRotationService::new(kv, 60, 10, 3600)
        .record_rate_limit(bot_id, idx)
        .await
}
