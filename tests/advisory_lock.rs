//! Advisory lock acquire/release against a live Redis instance (§3, §4.1).
//!
//! Requires `CONVEYOR_REDIS_URL` to point at a reachable Redis, the same way
//! every other process in this workspace resolves it.

use conveyor_shared::kv::{AdvisoryLock, KvStore};
use serial_test::serial;
use uuid::Uuid;

async fn kv() -> KvStore {
    let url = std::env::var("CONVEYOR_REDIS_URL").expect("CONVEYOR_REDIS_URL must be set for this test");
    KvStore::connect(&url).await.expect("connect to redis")
}

#[tokio::test]
#[serial]
async fn second_acquire_without_force_is_rejected_while_held() {
    let kv = kv().await;
    let bot_id = Uuid::new_v4();
    let lock = AdvisoryLock::crawl(bot_id);

    let guard = lock.acquire(&kv, Uuid::new_v4(), false).await.expect("first acquire succeeds");
    let second = lock.acquire(&kv, Uuid::new_v4(), false).await;
    assert!(second.is_err(), "lock is already held");

    guard.release(&kv).await.expect("release");
}

#[tokio::test]
#[serial]
async fn force_overwrites_an_existing_lock() {
    let kv = kv().await;
    let visitor_id = Uuid::new_v4();
    let lock = AdvisoryLock::grading(visitor_id);

    let _first = lock.acquire(&kv, Uuid::new_v4(), false).await.expect("first acquire succeeds");
    let second = lock.acquire(&kv, Uuid::new_v4(), true).await;
    assert!(second.is_ok(), "force overwrites rather than failing");
}

#[tokio::test]
#[serial]
async fn release_is_a_compare_and_delete() {
    let kv = kv().await;
    let visitor_id = Uuid::new_v4();
    let lock = AdvisoryLock::assessment(visitor_id);

    let guard = lock.acquire(&kv, Uuid::new_v4(), false).await.expect("acquire");
    guard.release(&kv).await.expect("release");

    // Released, so a fresh acquire (no force) should succeed again.
    let reacquired = lock.acquire(&kv, Uuid::new_v4(), false).await;
    assert!(reacquired.is_ok());
}
