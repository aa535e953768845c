//! Key-value abstraction over Redis: task state, advisory locks, pub/sub
//! progress and cancellation channels, and key-rotation bookkeeping (§3, §4).

mod key_rotation;
mod locks;
mod task_state;

pub use key_rotation::{KeyRotationService, KeyStats, SelectedKey};
pub use locks::{AdvisoryLock, LockGuard};
pub use task_state::{EventKind, ProgressEvent, TaskState, TaskStatus};

use redis::aio::ConnectionManager;
use redis::Client;

use crate::errors::{ConveyorError, ConveyorResult};

/// A cloneable handle to a Redis connection manager, shared by every
/// service in this crate that needs task state, locks, or pub/sub.
#[derive(Clone)]
pub struct KvStore {
    pub(crate) conn: ConnectionManager,
    client: Client,
}

impl KvStore {
    pub async fn connect(redis_url: &str) -> ConveyorResult<Self> {
        let client = Client::open(redis_url).map_err(ConveyorError::Redis)?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(ConveyorError::Redis)?;
        Ok(Self { conn, client })
    }

    /// Dedicated pub/sub connection subscribed to a single channel, used by
    /// the SSE bridge to follow `progress:<task_id>` after restoring the
    /// last known `TaskState` snapshot (§4.2).
    pub async fn subscribe(&self, channel: &str) -> ConveyorResult<redis::aio::PubSub> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(ConveyorError::Redis)?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(ConveyorError::Redis)?;
        Ok(pubsub)
    }

    /// Dedicated pub/sub connection subscribed to a glob pattern (e.g.
    /// `chat:cancel:*`), used by the chat worker's single cancellation
    /// subscriber task (§4.3).
    pub async fn subscribe_pattern(&self, pattern: &str) -> ConveyorResult<redis::aio::PubSub> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(ConveyorError::Redis)?;
        pubsub
            .psubscribe(pattern)
            .await
            .map_err(ConveyorError::Redis)?;
        Ok(pubsub)
    }

    /// Publish to an arbitrary channel — used for cancellation
    /// (`chat:cancel:<session_token>`) and crawl-stop signals (§4.3, §4.6).
    pub async fn publish_raw(&self, channel: &str, payload: &str) -> ConveyorResult<()> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let _: () = conn.publish(channel, payload).await?;
        Ok(())
    }

    /// Set the `CrawlStop(bot_id)` sentinel, observed cooperatively by a
    /// BFS crawl between batches (§4.6, §5).
    pub async fn set_crawl_stop(&self, bot_id: uuid::Uuid) -> ConveyorResult<()> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(Self::crawl_stop_key(bot_id), "1", 3600).await?;
        Ok(())
    }

    pub async fn is_crawl_stop_set(&self, bot_id: uuid::Uuid) -> ConveyorResult<bool> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(Self::crawl_stop_key(bot_id)).await?;
        Ok(exists)
    }

    pub async fn clear_crawl_stop(&self, bot_id: uuid::Uuid) -> ConveyorResult<()> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let _: () = conn.del(Self::crawl_stop_key(bot_id)).await?;
        Ok(())
    }

    fn crawl_stop_key(bot_id: uuid::Uuid) -> String {
        format!("crawl_stop:{bot_id}")
    }
}
