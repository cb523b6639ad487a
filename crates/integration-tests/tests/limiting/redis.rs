//! Limiters backed by a real Redis server at localhost:6379.
//!
//! Run with `cargo test -p integration-tests -- --ignored` while Redis is up.
//! Each storage below owns its own connection pool, the way separate
//! processes would.

use std::sync::Arc;
use std::time::Duration;

use config::RedisConfig;
use indoc::indoc;
use integration_tests::{limiter_config, redis_storage, scenarios};
use limiter::{Acquire, DistributedLimiter, RedisStore, Storage};

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore = "requires a running Redis at localhost:6379"]
async fn concurrency_never_exceeds_ceiling() {
    scenarios::concurrency_never_exceeds_ceiling(redis_storage().await, 200).await;
}

#[tokio::test]
#[ignore = "requires a running Redis at localhost:6379"]
async fn three_callers_two_slots() {
    scenarios::three_callers_two_slots(redis_storage().await).await;
}

#[tokio::test]
#[ignore = "requires a running Redis at localhost:6379"]
async fn release_is_idempotent() {
    scenarios::release_is_idempotent(redis_storage().await).await;
}

#[tokio::test]
#[ignore = "requires a running Redis at localhost:6379"]
async fn rate_denial_is_a_no_op() {
    scenarios::rate_denial_is_a_no_op(redis_storage().await).await;
}

#[tokio::test]
#[ignore = "requires a running Redis at localhost:6379"]
async fn rate_refills_up_to_capacity() {
    scenarios::rate_refills_up_to_capacity(redis_storage().await).await;
}

#[tokio::test]
#[ignore = "requires a running Redis at localhost:6379"]
async fn rate_borrowing_is_bounded() {
    scenarios::rate_borrowing_is_bounded(redis_storage().await).await;
}

#[tokio::test]
#[ignore = "requires a running Redis at localhost:6379"]
async fn window_quota_and_rollover() {
    scenarios::window_quota_and_rollover(redis_storage().await).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore = "requires a running Redis at localhost:6379"]
async fn ceiling_holds_across_processes() {
    let config = limiter_config(indoc! {r#"
        identity = "processes"
        max_concurrent = 4
        max_permit_request = 1
        concurrent_lease = "60s"
    "#});

    let first = Arc::new(DistributedLimiter::new(redis_storage().await, config.clone()).unwrap());
    let second = Arc::new(DistributedLimiter::new(redis_storage().await, config).unwrap());

    let tasks = (0..100).map(|i| {
        let limiter = if i % 2 == 0 { first.clone() } else { second.clone() };
        tokio::spawn(async move { limiter.try_acquire_concurrent().await })
    });

    let results: Vec<Acquire> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    assert_eq!(results.iter().filter(|r| **r == Acquire::Success).count(), 4);

    first.release_concurrent().await;
    assert_eq!(second.try_acquire_concurrent().await, Acquire::Success);
    assert_eq!(first.try_acquire_concurrent().await, Acquire::Failure);
}

#[tokio::test]
#[ignore = "requires a running Redis at localhost:6379"]
async fn window_is_shared_across_processes() {
    let config = limiter_config(indoc! {r#"
        identity = "window-processes"
        max_concurrent = 1
        max_permit_request = 2
        request_interval = "60s"
    "#});

    let first = DistributedLimiter::new(redis_storage().await, config.clone()).unwrap();
    let second = DistributedLimiter::new(redis_storage().await, config).unwrap();

    assert_eq!(first.try_acquire_request().await, Acquire::Success);
    assert_eq!(second.try_acquire_request().await, Acquire::Success);
    assert_eq!(first.try_acquire_request().await, Acquire::Failure);
    assert_eq!(second.try_acquire_request().await, Acquire::Failure);
}

#[tokio::test]
#[ignore = "requires a running Redis at localhost:6379"]
async fn unreleased_slot_expires_after_its_lease() {
    let config = limiter_config(indoc! {r#"
        identity = "lease"
        max_concurrent = 1
        max_permit_request = 1
        concurrent_lease = "200ms"
    "#});

    let limiter = DistributedLimiter::new(redis_storage().await, config).unwrap();

    assert_eq!(limiter.try_acquire_concurrent().await, Acquire::Success);
    assert_eq!(limiter.try_acquire_concurrent().await, Acquire::Failure);

    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(limiter.try_acquire_concurrent().await, Acquire::Success);
}

#[tokio::test]
async fn unreachable_server_is_an_exception() {
    let config = RedisConfig {
        url: "redis://127.0.0.1:1/0".to_string(),
        connection_timeout: Some(Duration::from_millis(200)),
        ..RedisConfig::default()
    };

    let store = Arc::new(Storage::Redis(RedisStore::connect_lazy(&config).unwrap()));

    scenarios::unanswered_store_is_an_exception(store, Duration::from_millis(500)).await;
}

#[tokio::test]
async fn unreachable_server_fails_to_connect() {
    let config = config::StorageConfig::Redis(Box::new(RedisConfig {
        url: "redis://127.0.0.1:1/0".to_string(),
        connection_timeout: Some(Duration::from_millis(200)),
        ..RedisConfig::default()
    }));

    let limiter = limiter_config(indoc! {r#"
        identity = "down"
        max_concurrent = 1
        max_permit_request = 1
    "#});

    let result = DistributedLimiter::connect(&config, limiter).await;

    assert!(result.is_err());
}
