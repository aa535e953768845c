//! Credential key rotation health, read from the same Redis counters the
//! chat worker's key selection writes to (§14 supplement).

use conveyor_shared::kv::{KeyRotationService, KvStore};

use crate::output;
use crate::BotCommands;

pub(crate) async fn handle(cmd: BotCommands, redis_url: &str) -> anyhow::Result<()> {
    let kv = KvStore::connect(redis_url).await?;

    match cmd {
        BotCommands::KeyStats { bot_id, key_count } => {
            // Cooldown parameters only affect `select()`; reading stats needs none of them.
            let rotation = KeyRotationService::new(&kv, 0, 0, 0);

            output::header(format!("Key stats for bot {bot_id}"));
            for idx in 0..key_count {
                let stats = rotation.key_stats(bot_id, idx).await?;
                output::label(
                    format!("  key[{idx}]"),
                    format!(
                        "{} rate limited, {} uses in the last hour",
                        stats.rate_limited_count, stats.usage_last_hour
                    ),
                );
            }
        }
    }

    Ok(())
}
