//! `TaskState` dual-write (publish + mirror) against a live Redis instance,
//! the same path `conveyor-ctl`'s `task status` command reads from (§3, §4.2).

use conveyor_shared::kv::{KvStore, ProgressEvent, TaskStatus};
use serial_test::serial;
use uuid::Uuid;

async fn kv() -> KvStore {
    let url = std::env::var("CONVEYOR_REDIS_URL").expect("CONVEYOR_REDIS_URL must be set for this test");
    KvStore::connect(&url).await.expect("connect to redis")
}

#[tokio::test]
#[serial]
async fn published_progress_is_readable_as_task_state() {
    let kv = kv().await;
    let task_id = Uuid::new_v4();

    let mut event = ProgressEvent::new(task_id, TaskStatus::Processing, 40);
    event.message = Some("embedding chunks".into());
    kv.publish_progress(&event).await.expect("publish");

    let state = kv.get_task_state(task_id).await.expect("get").expect("state present");
    assert_eq!(state.status, TaskStatus::Processing);
    assert_eq!(state.progress, 40);
    assert_eq!(state.message.as_deref(), Some("embedding chunks"));
}

#[tokio::test]
#[serial]
async fn unknown_task_id_has_no_state() {
    let kv = kv().await;
    let state = kv.get_task_state(Uuid::new_v4()).await.expect("get");
    assert!(state.is_none());
}
