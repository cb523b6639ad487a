//! Helpers shared by the limiter integration tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use config::{LimiterConfig, RedisConfig, StorageConfig};
use limiter::{DistributedLimiter, InMemoryStore, Storage};

/// Redis server the ignored tests expect.
pub const REDIS_URL: &str = "redis://localhost:6379/0";

static SEQUENCE: AtomicUsize = AtomicUsize::new(0);

/// An identity no other test or earlier run has used.
pub fn unique_identity(name: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();

    format!("{name}:{nanos}:{}", SEQUENCE.fetch_add(1, Ordering::Relaxed))
}

/// Parses a `[[limiters]]` entry, replacing the identity with a unique one.
pub fn limiter_config(toml: &str) -> LimiterConfig {
    let mut config: LimiterConfig = toml::from_str(toml).expect("limiter config should parse");
    config.identity = unique_identity(&config.identity);
    config
}

/// Limiters of `config` backed by a fresh in-memory store.
pub fn memory_limiter(config: LimiterConfig) -> DistributedLimiter<InMemoryStore> {
    DistributedLimiter::new(Arc::new(InMemoryStore::new()), config).expect("limiter config should be valid")
}

/// Storage connected to the local Redis, as a separate process would have.
pub async fn redis_storage() -> Arc<Storage> {
    let config = StorageConfig::Redis(Box::new(RedisConfig {
        url: REDIS_URL.to_string(),
        key_prefix: "neural:test:".to_string(),
        ..RedisConfig::default()
    }));

    let storage = Storage::new(&config).await.expect("Redis should be running on localhost:6379");

    Arc::new(storage)
}

/// Checks every store must pass, whatever executes the scripts.
pub mod scenarios {
    use std::sync::Arc;
    use std::time::Duration;

    use futures::future::join_all;
    use indoc::indoc;
    use limiter::{Acquire, DistributedLimiter, Store};

    use super::limiter_config;

    fn limiter<S: Store>(store: Arc<S>, toml: &str) -> Arc<DistributedLimiter<S>> {
        Arc::new(DistributedLimiter::new(store, limiter_config(toml)).expect("limiter config should be valid"))
    }

    fn count(results: &[Acquire], outcome: Acquire) -> usize {
        results.iter().filter(|result| **result == outcome).count()
    }

    /// Many simultaneous callers never hold more than `max_concurrent` slots.
    pub async fn concurrency_never_exceeds_ceiling<S: Store + 'static>(store: Arc<S>, callers: usize) {
        let limiter = limiter(
            store,
            indoc! {r#"
                identity = "stress"
                max_concurrent = 5
                max_permit_request = 1
                concurrent_lease = "60s"
            "#},
        );

        let tasks = (0..callers).map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.try_acquire_concurrent().await })
        });

        let results: Vec<Acquire> = join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.expect("acquire task should not panic"))
            .collect();

        assert_eq!(count(&results, Acquire::Success), 5);
        assert_eq!(count(&results, Acquire::Failure), callers - 5);
    }

    /// With two slots, three callers yield two grants and one denial, and a release frees a slot.
    pub async fn three_callers_two_slots<S: Store + 'static>(store: Arc<S>) {
        let limiter = limiter(
            store,
            indoc! {r#"
                identity = "two-slots"
                max_concurrent = 2
                max_permit_request = 1
                concurrent_lease = "60s"
            "#},
        );

        let results = join_all((0..3).map(|_| limiter.try_acquire_concurrent())).await;

        assert_eq!(count(&results, Acquire::Success), 2);
        assert_eq!(count(&results, Acquire::Failure), 1);

        limiter.release_concurrent().await;

        assert_eq!(limiter.try_acquire_concurrent().await, Acquire::Success);
        assert_eq!(limiter.try_acquire_concurrent().await, Acquire::Failure);
    }

    /// Releasing more than was acquired never lets extra callers in, nor locks them out.
    pub async fn release_is_idempotent<S: Store + 'static>(store: Arc<S>) {
        let limiter = limiter(
            store,
            indoc! {r#"
                identity = "idempotent"
                max_concurrent = 1
                max_permit_request = 1
                concurrent_lease = "60s"
            "#},
        );

        assert_eq!(limiter.try_acquire_concurrent().await, Acquire::Success);

        for _ in 0..3 {
            limiter.release_concurrent().await;
        }

        assert_eq!(limiter.try_acquire_concurrent().await, Acquire::Success);
        assert_eq!(limiter.try_acquire_concurrent().await, Acquire::Failure);
    }

    /// A request the bucket cannot cover is denied, and denying it again changes nothing.
    pub async fn rate_denial_is_a_no_op<S: Store + 'static>(store: Arc<S>) {
        let limiter = limiter(
            store,
            indoc! {r#"
                identity = "no-op"
                max_concurrent = 1
                max_permit_request = 10
                request_interval = "1s"

                [rate]
                permits = 6
                max_wait = "100ms"
            "#},
        );

        let rate = limiter.rate();

        assert_eq!(rate.try_acquire_at(1_000).await, Acquire::Success);

        // Four tokens left, the two missing ones take 200ms to refill.
        for _ in 0..3 {
            assert_eq!(rate.try_acquire_at(1_000).await, Acquire::Failure);
        }

        // 100ms later one token refilled and the remaining wait fits the allowance.
        assert_eq!(rate.try_acquire_at(1_100).await, Acquire::Success);
    }

    /// An idle bucket fills up to its capacity and no further.
    pub async fn rate_refills_up_to_capacity<S: Store + 'static>(store: Arc<S>) {
        let limiter = limiter(
            store,
            indoc! {r#"
                identity = "refill"
                max_concurrent = 1
                max_permit_request = 4
                request_interval = "400ms"
            "#},
        );

        let rate = limiter.rate();

        for _ in 0..4 {
            assert_eq!(rate.try_acquire_at(0).await, Acquire::Success);
        }

        assert_eq!(rate.try_acquire_at(0).await, Acquire::Failure);

        // Half the interval refills half the bucket.
        assert_eq!(rate.try_acquire_at(200).await, Acquire::Success);
        assert_eq!(rate.try_acquire_at(200).await, Acquire::Success);
        assert_eq!(rate.try_acquire_at(200).await, Acquire::Failure);

        // A long idle period still only refills the capacity.
        for _ in 0..4 {
            assert_eq!(rate.try_acquire_at(60_000).await, Acquire::Success);
        }

        assert_eq!(rate.try_acquire_at(60_000).await, Acquire::Failure);
    }

    /// Borrowing against future refills stops at `max_wait`.
    pub async fn rate_borrowing_is_bounded<S: Store + 'static>(store: Arc<S>) {
        let limiter = limiter(
            store,
            indoc! {r#"
                identity = "borrow"
                max_concurrent = 1
                max_permit_request = 10
                request_interval = "1s"

                [rate]
                reserved_percent = 20
                max_wait = "300ms"
            "#},
        );

        let rate = limiter.rate();
        let mut granted = 0;

        for _ in 0..20 {
            if rate.try_acquire_at(0).await == Acquire::Success {
                granted += 1;
            }
        }

        // Eight tokens above the reserve, plus three borrowed at 100ms each.
        assert_eq!(granted, 11);
    }

    /// Exactly the quota fits in one window, and the next window starts over.
    pub async fn window_quota_and_rollover<S: Store + 'static>(store: Arc<S>) {
        let limiter = limiter(
            store,
            indoc! {r#"
                identity = "window"
                max_concurrent = 1
                max_permit_request = 3
                request_interval = "1s"
            "#},
        );

        let request = limiter.request();
        let start = 1_700_000_000_000;

        for offset in [0, 1, 500] {
            assert_eq!(request.try_acquire_at(start + offset).await, Acquire::Success);
        }

        assert_eq!(request.try_acquire_at(start + 999).await, Acquire::Failure);

        for offset in [1_000, 1_200, 1_999] {
            assert_eq!(request.try_acquire_at(start + offset).await, Acquire::Success);
        }

        assert_eq!(request.try_acquire_at(start + 1_999).await, Acquire::Failure);
    }

    /// A store that does not answer in time yields an exception, not a verdict.
    pub async fn unanswered_store_is_an_exception<S: Store + 'static>(store: Arc<S>, timeout: Duration) {
        let mut config = limiter_config(indoc! {r#"
            identity = "slow"
            max_concurrent = 1
            max_permit_request = 1
        "#});

        config.concurrent_timeout = timeout;
        config.request_timeout = timeout;

        let limiter = DistributedLimiter::new(store, config).expect("limiter config should be valid");

        assert_eq!(limiter.try_acquire_concurrent().await, Acquire::Exception);
        assert_eq!(limiter.try_acquire_rate().await, Acquire::Exception);
        assert_eq!(limiter.try_acquire_request().await, Acquire::Exception);
    }
}
