use std::sync::Arc;
use std::time::Duration;

use config::Config;
use indoc::indoc;
use integration_tests::{limiter_config, memory_limiter, scenarios};
use limiter::{Acquire, DistributedLimiter, InMemoryStore, Script, Store, StoreError};

/// Answers like the in-memory store, after `delay`.
struct Delayed {
    inner: InMemoryStore,
    delay: Duration,
}

impl Store for Delayed {
    async fn eval(
        &self,
        script: Script,
        timeout: Duration,
        keys: &[&str],
        values: &[i64],
    ) -> Result<Option<i64>, StoreError> {
        tokio::time::timeout(timeout, async {
            tokio::time::sleep(self.delay).await;
            self.inner.eval(script, timeout, keys, values).await
        })
        .await
        .map_err(|_| StoreError::Timeout(timeout))?
    }
}

fn store() -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::new())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrency_never_exceeds_ceiling() {
    scenarios::concurrency_never_exceeds_ceiling(store(), 500).await;
}

#[tokio::test]
async fn three_callers_two_slots() {
    scenarios::three_callers_two_slots(store()).await;
}

#[tokio::test]
async fn release_is_idempotent() {
    scenarios::release_is_idempotent(store()).await;
}

#[tokio::test]
async fn rate_denial_is_a_no_op() {
    scenarios::rate_denial_is_a_no_op(store()).await;
}

#[tokio::test]
async fn rate_refills_up_to_capacity() {
    scenarios::rate_refills_up_to_capacity(store()).await;
}

#[tokio::test]
async fn rate_borrowing_is_bounded() {
    scenarios::rate_borrowing_is_bounded(store()).await;
}

#[tokio::test]
async fn window_quota_and_rollover() {
    scenarios::window_quota_and_rollover(store()).await;
}

#[tokio::test(start_paused = true)]
async fn slow_store_is_an_exception() {
    let store = Arc::new(Delayed {
        inner: InMemoryStore::new(),
        delay: Duration::from_secs(5),
    });

    scenarios::unanswered_store_is_an_exception(store, Duration::from_millis(50)).await;
}

#[tokio::test(start_paused = true)]
async fn store_answering_in_time_is_a_verdict() {
    let store = Arc::new(Delayed {
        inner: InMemoryStore::new(),
        delay: Duration::from_millis(10),
    });

    let config = limiter_config(indoc! {r#"
        identity = "prompt"
        max_concurrent = 1
        max_permit_request = 1
        concurrent_timeout = "100ms"
    "#});

    let limiter = DistributedLimiter::new(store, config).unwrap();

    assert_eq!(limiter.try_acquire_concurrent().await, Acquire::Success);
    assert_eq!(limiter.try_acquire_concurrent().await, Acquire::Failure);
}

#[tokio::test]
async fn limiters_sharing_a_store_share_counters() {
    let store = store();

    let config = limiter_config(indoc! {r#"
        identity = "shared"
        max_concurrent = 2
        max_permit_request = 2
        request_interval = "60s"
    "#});

    let first = DistributedLimiter::new(store.clone(), config.clone()).unwrap();
    let second = DistributedLimiter::new(store, config).unwrap();

    assert_eq!(first.try_acquire_concurrent().await, Acquire::Success);
    assert_eq!(second.try_acquire_concurrent().await, Acquire::Success);
    assert_eq!(first.try_acquire_concurrent().await, Acquire::Failure);

    second.release_concurrent().await;
    assert_eq!(first.try_acquire_concurrent().await, Acquire::Success);

    assert_eq!(first.try_acquire_request().await, Acquire::Success);
    assert_eq!(second.try_acquire_request().await, Acquire::Success);
    assert_eq!(second.try_acquire_request().await, Acquire::Failure);
}

#[tokio::test]
async fn separate_stores_keep_separate_counters() {
    let config = limiter_config(indoc! {r#"
        identity = "isolated"
        max_concurrent = 1
        max_permit_request = 1
    "#});

    let first = memory_limiter(config.clone());
    let second = memory_limiter(config);

    assert_eq!(first.try_acquire_concurrent().await, Acquire::Success);
    assert_eq!(second.try_acquire_concurrent().await, Acquire::Success);
}

#[tokio::test]
async fn limiters_from_a_configuration_file() {
    let config = Config::from_toml(indoc! {r#"
        [storage]
        type = "memory"

        [[limiters]]
        identity = "search"
        max_concurrent = 1
        max_permit_request = 2
        request_interval = "60s"

        [[limiters]]
        identity = "checkout"
        max_concurrent = 3
        max_permit_request = 1

        [limiters.rate]
        permits = 1
        reserved_percent = 10
        max_wait = "250ms"
    "#})
    .unwrap();

    let search = config.limiter("search").cloned().unwrap();
    let limiter = DistributedLimiter::connect(&config.storage, search).await.unwrap();

    assert_eq!(limiter.try_acquire_concurrent().await, Acquire::Success);
    assert_eq!(limiter.try_acquire_concurrent().await, Acquire::Failure);

    assert_eq!(limiter.try_acquire_request().await, Acquire::Success);
    assert_eq!(limiter.try_acquire_request().await, Acquire::Success);
    assert_eq!(limiter.try_acquire_request().await, Acquire::Failure);

    let checkout = config.limiter("checkout").unwrap();
    assert_eq!(checkout.rate.max_wait, Duration::from_millis(250));
    assert_eq!(checkout.rate.reserved_percent, 10);
}
