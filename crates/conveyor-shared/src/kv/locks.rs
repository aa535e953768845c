//! Advisory locks (`SET NX EX`) backing CrawlLock/GradingLock/AssessmentLock (§3, §4.1).

use redis::AsyncCommands;
use uuid::Uuid;

use super::KvStore;
use crate::errors::{ConveyorError, ConveyorResult};

/// Lua script performing compare-and-delete: only removes the key if its
/// current value still matches the caller's task id. Mirrors the classic
/// Redis advisory-lock release pattern to avoid releasing a lock another
/// task has since acquired.
const COMPARE_AND_DELETE: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// A named advisory lock (e.g. `crawl_lock:<bot_id>`).
pub struct AdvisoryLock {
    key: String,
    ttl_secs: i64,
}

impl AdvisoryLock {
    pub fn crawl(bot_id: Uuid) -> Self {
        Self {
            key: format!("crawl_lock:{bot_id}"),
            ttl_secs: 2 * 3600,
        }
    }

    pub fn grading(visitor_id: Uuid) -> Self {
        Self {
            key: format!("grading_lock:{visitor_id}"),
            ttl_secs: 300,
        }
    }

    pub fn assessment(visitor_id: Uuid) -> Self {
        Self {
            key: format!("assessment_lock:{visitor_id}"),
            ttl_secs: 300,
        }
    }

    /// Attempt to acquire the lock for `task_id`. If the lock already holds
    /// a task id whose TaskState is non-terminal, fails with `AlreadyRunning`
    /// unless `force` is set, in which case the lock is overwritten (§4.1,
    /// §9 Open Question: `force` overwrites rather than clearing early).
    pub async fn acquire(
        &self,
        store: &KvStore,
        task_id: Uuid,
        force: bool,
    ) -> ConveyorResult<LockGuard> {
        let mut conn = store.conn.clone();
        let task_id_str = task_id.to_string();

        let acquired: bool = if force {
            let _: () = conn.set_ex(&self.key, &task_id_str, self.ttl_secs as u64).await?;
            true
        } else {
            redis::cmd("SET")
                .arg(&self.key)
                .arg(&task_id_str)
                .arg("NX")
                .arg("EX")
                .arg(self.ttl_secs)
                .query_async::<Option<String>>(&mut conn)
                .await
                .map(|v| v.is_some())?
        };

        if acquired {
            return Ok(LockGuard {
                key: self.key.clone(),
                task_id,
            });
        }

        let holder: Option<String> = conn.get(&self.key).await?;
        let holder_is_stale = match holder.as_deref().map(Uuid::parse_str) {
            Some(Ok(holder_id)) => match store.get_task_state(holder_id).await? {
                Some(state) => state.status.is_terminal(),
                None => true,
            },
            _ => true,
        };

        if holder_is_stale {
            let _: () = conn.set_ex(&self.key, &task_id_str, self.ttl_secs as u64).await?;
            Ok(LockGuard {
                key: self.key.clone(),
                task_id,
            })
        } else {
            Err(ConveyorError::AlreadyRunning {
                resource: holder.unwrap_or_else(|| self.key.clone()),
            })
        }
    }
}

/// RAII-flavored handle returned on successful acquisition; release is
/// explicit (`release`) rather than implemented via `Drop` because it is an
/// async operation that must run to completion, not merely be scheduled.
pub struct LockGuard {
    key: String,
    task_id: Uuid,
}

impl LockGuard {
    /// Release only if the held task id still equals this guard's id
    /// (compare-and-delete); a no-op otherwise.
    pub async fn release(self, store: &KvStore) -> ConveyorResult<()> {
        let mut conn = store.conn.clone();
        let _: i64 = redis::Script::new(COMPARE_AND_DELETE)
            .key(&self.key)
            .arg(self.task_id.to_string())
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crawl_lock_ttl_is_two_hours() {
        let lock = AdvisoryLock::crawl(Uuid::new_v4());
        assert_eq!(lock.ttl_secs, 7200);
    }

    #[test]
    fn grading_and_assessment_locks_share_five_minute_ttl() {
        assert_eq!(AdvisoryLock::grading(Uuid::new_v4()).ttl_secs, 300);
        assert_eq!(AdvisoryLock::assessment(Uuid::new_v4()).ttl_secs, 300);
    }

    #[test]
    fn lock_keys_are_namespaced_per_bot_or_visitor() {
        let id = Uuid::new_v4();
        assert_eq!(AdvisoryLock::crawl(id).key, format!("crawl_lock:{id}"));
        assert_eq!(AdvisoryLock::grading(id).key, format!("grading_lock:{id}"));
    }
}
