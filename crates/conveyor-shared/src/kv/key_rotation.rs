//! Round-robin key selection with 429 cooldown quarantine (§4.4).
//!
//! Ground truth for the exact selection and cooldown arithmetic is
//! `chat-worker/app/services/key_rotation.py` in the original implementation.

use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::KvStore;
use crate::errors::{ConveyorError, ConveyorResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct KeyState {
    last_429_at: Option<DateTime<Utc>>,
    cooldown_until: Option<DateTime<Utc>>,
    rate_limited_count: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct SelectedKey {
    pub index: usize,
}

#[derive(Debug, Clone, Default)]
pub struct KeyStats {
    pub rate_limited_count: u32,
    pub usage_last_hour: u64,
}

pub struct KeyRotationService<'a> {
    store: &'a KvStore,
    cooldown_secs: i64,
    cooldown_buffer_secs: i64,
    index_ttl_secs: i64,
}

impl<'a> KeyRotationService<'a> {
    pub fn new(store: &'a KvStore, cooldown_secs: u64, cooldown_buffer_secs: u64, index_ttl_secs: u64) -> Self {
        Self {
            store,
            cooldown_secs: cooldown_secs as i64,
            cooldown_buffer_secs: cooldown_buffer_secs as i64,
            index_ttl_secs: index_ttl_secs as i64,
        }
    }

    fn index_key(bot_id: Uuid) -> String {
        format!("key_index:{bot_id}")
    }

    fn state_key(bot_id: Uuid, idx: usize) -> String {
        format!("key_state:{bot_id}:{idx}")
    }

    fn usage_key(bot_id: Uuid, idx: usize) -> String {
        format!("key_usage:{bot_id}:{idx}")
    }

    async fn read_state(&self, bot_id: Uuid, idx: usize) -> ConveyorResult<KeyState> {
        let mut conn = self.store.conn.clone();
        let raw: Option<String> = conn.get(Self::state_key(bot_id, idx)).await?;
        Ok(match raw {
            Some(s) => serde_json::from_str(&s)?,
            None => KeyState::default(),
        })
    }

    /// Scan from `KeyIndex(bot_id)` modulo `len`, returning the first
    /// candidate whose cooldown has expired, and advancing the index.
    pub async fn select(&self, bot_id: Uuid, len: usize) -> ConveyorResult<SelectedKey> {
        if len == 0 {
            return Err(ConveyorError::AllKeysExhausted {
                bot_id: bot_id.to_string(),
            });
        }

        let mut conn = self.store.conn.clone();
        let start: usize = conn
            .get::<_, Option<u64>>(Self::index_key(bot_id))
            .await?
            .unwrap_or(0) as usize
            % len;

        let now = Utc::now();
        for step in 0..len {
            let idx = (start + step) % len;
            let state = self.read_state(bot_id, idx).await?;
            let quarantined = state.cooldown_until.map(|until| until > now).unwrap_or(false);
            if !quarantined {
                let next = (idx + 1) % len;
                let _: () = conn
                    .set_ex(Self::index_key(bot_id), next as u64, self.index_ttl_secs as u64)
                    .await?;
                return Ok(SelectedKey { index: idx });
            }
        }

        Err(ConveyorError::AllKeysExhausted {
            bot_id: bot_id.to_string(),
        })
    }

    /// Record an upstream 429 for the given key, placing it in cooldown.
    pub async fn record_rate_limit(&self, bot_id: Uuid, idx: usize) -> ConveyorResult<()> {
        let mut conn = self.store.conn.clone();
        let now = Utc::now();
        let mut state = self.read_state(bot_id, idx).await?;
        state.last_429_at = Some(now);
        state.cooldown_until = Some(now + chrono::Duration::seconds(self.cooldown_secs));
        state.rate_limited_count += 1;

        let ttl = self.cooldown_secs + self.cooldown_buffer_secs;
        let _: () = conn
            .set_ex(Self::state_key(bot_id, idx), serde_json::to_string(&state)?, ttl as u64)
            .await?;
        Ok(())
    }

    /// Rolling 1-hour usage counter, read by the bot-health surface (§14 supplement).
    pub async fn record_usage(&self, bot_id: Uuid, idx: usize) -> ConveyorResult<()> {
        let mut conn = self.store.conn.clone();
        let key = Self::usage_key(bot_id, idx);
        let count: u64 = conn.incr(&key, 1).await?;
        if count == 1 {
            let _: () = conn.expire(&key, 3600).await?;
        }
        Ok(())
    }

    pub async fn key_stats(&self, bot_id: Uuid, idx: usize) -> ConveyorResult<KeyStats> {
        let mut conn = self.store.conn.clone();
        let state = self.read_state(bot_id, idx).await?;
        let usage: u64 = conn
            .get::<_, Option<u64>>(Self::usage_key(bot_id, idx))
            .await?
            .unwrap_or(0);
        Ok(KeyStats {
            rate_limited_count: state.rate_limited_count,
            usage_last_hour: usage,
        })
    }
}

#[cfg(test)]
mod tests {
    // Selection arithmetic below is pure enough to unit test without Redis
    // by inlining the modulo-scan logic; the integration behavior (actually
    // skipping quarantined keys via real cooldown state) is covered by
    // chat-worker tests against the in-memory KV test double.

    #[test]
    fn modulo_scan_wraps_around() {
        let len = 3usize;
        let start = 2usize;
        let order: Vec<usize> = (0..len).map(|step| (start + step) % len).collect();
        assert_eq!(order, vec![2, 0, 1]);
    }
}
