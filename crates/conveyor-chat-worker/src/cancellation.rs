//! Pattern-subscribed cancellation (§4.3): the gateway publishes on
//! `chat:cancel:<session_token>` when a session closes; this worker
//! maintains an in-process `session_token -> task handle` map and a single
//! subscriber task on the `chat:cancel:*` pattern.

use std::sync::Arc;

use conveyor_shared::kv::KvStore;
use dashmap::DashMap;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Tracks in-flight chat tasks so a cancellation message can be routed to
/// the right task's cooperative cancellation token (§14 supplement).
#[derive(Clone, Default)]
pub struct CancellationRegistry {
    tasks: Arc<DashMap<String, CancellationToken>>,
}

impl CancellationRegistry {
    pub fn register(&self, session_token: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.tasks.insert(session_token.to_string(), token.clone());
        token
    }

    pub fn unregister(&self, session_token: &str) {
        self.tasks.remove(session_token);
    }

    fn cancel(&self, session_token: &str) {
        if let Some((_, token)) = self.tasks.remove(session_token) {
            token.cancel();
        }
    }
}

#[derive(Debug, Deserialize)]
struct CancelMessage {
    session_token: String,
}

/// Runs for the lifetime of the process: subscribes to the `chat:cancel:*`
/// pattern and cancels the matching in-flight task's token, if any.
/// A session with no tracked task (already finished, or never started) is
/// silently ignored — cancellation here is best-effort, not an error (§4.3).
pub async fn run(kv: KvStore, registry: CancellationRegistry) {
    loop {
        match kv.subscribe_pattern("chat:cancel:*").await {
            Ok(mut pubsub) => {
                use futures::StreamExt;
                let mut messages = pubsub.on_message();
                while let Some(msg) = messages.next().await {
                    let Ok(payload) = msg.get_payload::<String>() else {
                        continue;
                    };
                    let Ok(cancel) = serde_json::from_str::<CancelMessage>(&payload) else {
                        continue;
                    };
                    info!(session_token = %cancel.session_token, "received cancellation");
                    registry.cancel(&cancel.session_token);
                }
            }
            Err(err) => {
                warn!(%err, "cancellation subscriber lost connection, retrying");
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_cancel_trips_the_token() {
        let registry = CancellationRegistry::default();
        let token = registry.register("session-1");
        assert!(!token.is_cancelled());
        registry.cancel("session-1");
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancelling_unknown_session_is_a_noop() {
        let registry = CancellationRegistry::default();
        registry.cancel("unknown");
    }

    #[test]
    fn unregister_removes_without_cancelling() {
        let registry = CancellationRegistry::default();
        let token = registry.register("session-1");
        registry.unregister("session-1");
        registry.cancel("session-1");
        assert!(!token.is_cancelled());
    }
}
