//! Credential selection for the scoring worker's LLM judgement call.
//!
//! Same round-robin-with-cooldown approach as the chat worker's key
//! selection, duplicated rather than shared because the two workers use
//! different dependency containers.

use conveyor_shared::domain::ProviderConfig;
use conveyor_shared::errors::{ConveyorError, ConveyorResult};
use conveyor_shared::kv::{KeyRotationService, KvStore};
use conveyor_shared::llm::ApiKey;
use uuid::Uuid;

use crate::ScoringWorkerState;

pub struct SelectedCredential {
    pub key: ApiKey,
    pub index: usize,
}

pub async fn select(
    worker: &ScoringWorkerState,
    bot_id: Uuid,
    provider: &ProviderConfig,
) -> ConveyorResult<SelectedCredential> {
    let active: Vec<_> = provider.active_credentials().collect();
    let rotation = KeyRotationService::new(
        &worker.kv,
        worker.config.key_rotation.cooldown_secs,
        worker.config.key_rotation.cooldown_buffer_secs,
        worker.config.key_rotation.index_ttl_secs,
    );
    let selected = rotation.select(bot_id, active.len()).await?;
    let entry = active
        .get(selected.index)
        .ok_or_else(|| ConveyorError::AllKeysExhausted {
            bot_id: bot_id.to_string(),
        })?;
    let plaintext = worker
        .credential_cipher
        .decrypt_to_string(&entry.ciphertext)
        .map_err(|e| ConveyorError::crypto(e.to_string()))?;
    Ok(SelectedCredential {
        key: ApiKey(plaintext),
        index: selected.index,
    })
}
