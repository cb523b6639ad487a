//! In-memory store running the limiter scripts natively.
//!
//! Every script holds the map entry of its key for the whole read-modify-write,
//! which gives the same per-key atomicity Redis gives a Lua script. Counters are
//! only shared between limiters of this process.

use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use super::{Script, Store, StoreError, check_arguments, with_timeout};

/// In-memory store implementation.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    concurrent: DashMap<String, Slots>,
    buckets: DashMap<String, Bucket>,
    windows: DashMap<String, Window>,
}

#[derive(Debug, Clone, Copy)]
struct Slots {
    count: i64,
    expires_at: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Bucket {
    tokens: f64,
    last: i64,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    start: i64,
    count: i64,
}

/// Arguments of one token bucket acquisition, in script order.
#[derive(Debug, Clone, Copy)]
struct RateRequest {
    permits: i64,
    now: i64,
    reserved_percent: i64,
    max_wait: i64,
    capacity: i64,
    interval: i64,
}

const RELEASE: i64 = 1;

impl InMemoryStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn concurrent(&self, key: &str, values: &[i64]) -> Result<i64, StoreError> {
        let &[max_concurrent, direction, lease] = values else {
            return Err(arity_error(Script::Concurrent, values));
        };

        let now = Instant::now();

        let (reply, drained) = {
            let mut slots = self.concurrent.entry(key.to_string()).or_insert(Slots {
                count: 0,
                expires_at: None,
            });

            if slots.expires_at.is_some_and(|at| at <= now) {
                slots.count = 0;
                slots.expires_at = None;
            }

            if direction == RELEASE {
                slots.count = (slots.count - 1).max(0);
                (1, slots.count == 0)
            } else if slots.count < max_concurrent {
                slots.count += 1;

                if lease > 0 {
                    slots.expires_at = now.checked_add(Duration::from_millis(lease.unsigned_abs()));
                }

                (1, false)
            } else {
                (0, slots.count == 0)
            }
        };

        if drained {
            self.concurrent.remove_if(key, |_, slots| slots.count == 0);
        }

        Ok(reply)
    }

    fn rate(&self, key: &str, values: &[i64]) -> Result<i64, StoreError> {
        let &[permits, now, reserved_percent, max_wait, capacity, interval] = values else {
            return Err(arity_error(Script::Rate, values));
        };

        let request = RateRequest {
            permits,
            now,
            reserved_percent,
            max_wait,
            capacity,
            interval,
        };

        if capacity <= 0 || permits > capacity {
            return Ok(0);
        }

        let granted = match self.buckets.entry(key.to_string()) {
            Entry::Occupied(mut entry) => match take(refill(Some(*entry.get()), &request), &request) {
                Some(next) => {
                    entry.insert(next);
                    true
                }
                None => false,
            },
            Entry::Vacant(entry) => match take(refill(None, &request), &request) {
                Some(next) => {
                    entry.insert(next);
                    true
                }
                None => false,
            },
        };

        Ok(i64::from(granted))
    }

    fn request(&self, key: &str, values: &[i64]) -> Result<i64, StoreError> {
        let &[max_permits, interval, now] = values else {
            return Err(arity_error(Script::Request, values));
        };

        if max_permits <= 0 {
            return Ok(0);
        }

        let mut window = self
            .windows
            .entry(key.to_string())
            .or_insert(Window { start: now, count: 0 });

        if now.saturating_sub(window.start) >= interval {
            *window = Window { start: now, count: 1 };
            return Ok(1);
        }

        if window.count < max_permits {
            window.count += 1;
            Ok(1)
        } else {
            Ok(0)
        }
    }
}

/// Brings the bucket up to `request.now`. A missing bucket starts full.
fn refill(current: Option<Bucket>, request: &RateRequest) -> Bucket {
    let capacity = request.capacity as f64;

    match current {
        None => Bucket {
            tokens: capacity,
            last: request.now,
        },
        Some(bucket) if request.interval <= 0 => Bucket {
            tokens: capacity,
            last: bucket.last,
        },
        Some(bucket) => {
            let elapsed = request.now.saturating_sub(bucket.last).max(0) as f64;

            Bucket {
                tokens: (bucket.tokens + elapsed * capacity / request.interval as f64).min(capacity),
                last: bucket.last,
            }
        }
    }
}

/// Debits the bucket, or returns `None` when the request must be denied.
fn take(bucket: Bucket, request: &RateRequest) -> Option<Bucket> {
    let capacity = request.capacity as f64;
    let permits = request.permits as f64;
    let available = bucket.tokens - capacity * request.reserved_percent as f64 / 100.0;

    if available < permits {
        if request.max_wait <= 0 || request.interval <= 0 {
            return None;
        }

        let wait = (permits - available) * request.interval as f64 / capacity;

        if wait > request.max_wait as f64 {
            return None;
        }
    }

    Some(Bucket {
        tokens: bucket.tokens - permits,
        last: bucket.last.max(request.now),
    })
}

fn arity_error(script: Script, values: &[i64]) -> StoreError {
    StoreError::Query(format!(
        "{} expects {} values, got {}",
        script.name(),
        script.arity(),
        values.len()
    ))
}

impl Store for InMemoryStore {
    async fn eval(
        &self,
        script: Script,
        timeout: Duration,
        keys: &[&str],
        values: &[i64],
    ) -> Result<Option<i64>, StoreError> {
        check_arguments(script, keys, values)?;

        let Some(key) = keys.first() else {
            return Err(StoreError::Query(format!("{} expects exactly one key", script.name())));
        };

        log::trace!("Evaluating {} for key '{key}' with {values:?}", script.name());

        with_timeout(timeout, async {
            let reply = match script {
                Script::Concurrent => self.concurrent(key, values)?,
                Script::Rate => self.rate(key, values)?,
                Script::Request => self.request(key, values)?,
            };

            Ok(Some(reply))
        })
        .await
    }
}
