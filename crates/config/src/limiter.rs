//! Per-resource limiter configuration.

use std::time::Duration;

use anyhow::bail;
use duration_str::{deserialize_duration, deserialize_option_duration};
use serde::Deserialize;

/// Limits enforced for a single protected resource.
///
/// A limiter takes this by value and never mutates it. Changing a limit means
/// building a new limiter from a new configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimiterConfig {
    /// Name of the protected resource, used as the store key.
    pub identity: String,
    /// Ceiling on simultaneous in-flight acquisitions.
    pub max_concurrent: u32,
    /// Bound on the concurrency script's execution time.
    #[serde(default = "default_timeout", deserialize_with = "deserialize_duration")]
    pub concurrent_timeout: Duration,
    /// How long an unreleased concurrency slot survives in the store.
    ///
    /// Falls back to `concurrent_timeout` when unset.
    #[serde(default, deserialize_with = "deserialize_option_duration")]
    pub concurrent_lease: Option<Duration>,
    /// Permits granted per `request_interval`, shared by the rate and request-window limiters.
    pub max_permit_request: u32,
    /// Length of the quota window and of one full bucket refill.
    #[serde(default = "default_request_interval", deserialize_with = "deserialize_duration")]
    pub request_interval: Duration,
    /// Bound on the rate and request-window scripts' execution time.
    #[serde(default = "default_timeout", deserialize_with = "deserialize_duration")]
    pub request_timeout: Duration,
    /// Token bucket parameters.
    #[serde(default)]
    pub rate: RateConfig,
}

/// Token bucket parameters of the rate limiter.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateConfig {
    /// Tokens taken from the bucket by one acquisition.
    pub permits: u32,
    /// Percentage of the bucket capacity kept back from ordinary acquisitions.
    pub reserved_percent: u8,
    /// Longest refill wait an acquisition may borrow against.
    ///
    /// Zero denies as soon as the bucket cannot cover the request.
    #[serde(deserialize_with = "deserialize_duration")]
    pub max_wait: Duration,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            permits: 1,
            reserved_percent: 0,
            max_wait: Duration::ZERO,
        }
    }
}

fn default_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_request_interval() -> Duration {
    Duration::from_secs(1)
}

impl LimiterConfig {
    /// Creates a configuration for `identity` with zeroed limits and default timeouts.
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            max_concurrent: 0,
            concurrent_timeout: default_timeout(),
            concurrent_lease: None,
            max_permit_request: 0,
            request_interval: default_request_interval(),
            request_timeout: default_timeout(),
            rate: RateConfig::default(),
        }
    }

    /// Expiry of the concurrency counter.
    pub fn concurrent_lease(&self) -> Duration {
        self.concurrent_lease.unwrap_or(self.concurrent_timeout)
    }

    /// Checks the invariants every limiter relies on.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.identity.trim().is_empty() {
            bail!("Limiter identity must not be empty");
        }

        if self.concurrent_timeout.is_zero() {
            bail!("Limiter '{}': concurrent_timeout must be greater than zero", self.identity);
        }

        if self.request_timeout.is_zero() {
            bail!("Limiter '{}': request_timeout must be greater than zero", self.identity);
        }

        if self.concurrent_lease.is_some_and(|lease| lease.is_zero()) {
            bail!("Limiter '{}': concurrent_lease must be greater than zero", self.identity);
        }

        if self.rate.reserved_percent > 100 {
            bail!(
                "Limiter '{}': reserved_percent must be between 0 and 100, got {}",
                self.identity,
                self.rate.reserved_percent
            );
        }

        Ok(())
    }

    /// Settings that are valid but will never admit anything.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.max_concurrent == 0 {
            warnings.push(format!(
                "Limiter '{}' has max_concurrent = 0, every concurrent acquisition will be denied",
                self.identity
            ));
        }

        if self.max_permit_request == 0 {
            warnings.push(format!(
                "Limiter '{}' has max_permit_request = 0, every rate and request acquisition will be denied",
                self.identity
            ));
        } else if self.rate.permits > self.max_permit_request {
            warnings.push(format!(
                "Limiter '{}' requests {} permits per acquisition but the bucket only holds {}",
                self.identity, self.rate.permits, self.max_permit_request
            ));
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use insta::assert_debug_snapshot;

    use super::*;

    #[test]
    fn minimal_limiter_uses_defaults() {
        let toml = indoc! {r#"
            identity = "orders:create"
            max_concurrent = 4
            max_permit_request = 100
        "#};

        let config: LimiterConfig = toml::from_str(toml).unwrap();

        assert_debug_snapshot!(config, @r#"
        LimiterConfig {
            identity: "orders:create",
            max_concurrent: 4,
            concurrent_timeout: 1s,
            concurrent_lease: None,
            max_permit_request: 100,
            request_interval: 1s,
            request_timeout: 1s,
            rate: RateConfig {
                permits: 1,
                reserved_percent: 0,
                max_wait: 0ns,
            },
        }
        "#);
    }

    #[test]
    fn full_limiter() {
        let toml = indoc! {r#"
            identity = "orders:create"
            max_concurrent = 8
            concurrent_timeout = "200ms"
            concurrent_lease = "30s"
            max_permit_request = 50
            request_interval = "10s"
            request_timeout = "150ms"

            [rate]
            permits = 2
            reserved_percent = 10
            max_wait = "50ms"
        "#};

        let config: LimiterConfig = toml::from_str(toml).unwrap();

        assert_debug_snapshot!(config, @r#"
        LimiterConfig {
            identity: "orders:create",
            max_concurrent: 8,
            concurrent_timeout: 200ms,
            concurrent_lease: Some(
                30s,
            ),
            max_permit_request: 50,
            request_interval: 10s,
            request_timeout: 150ms,
            rate: RateConfig {
                permits: 2,
                reserved_percent: 10,
                max_wait: 50ms,
            },
        }
        "#);

        assert_eq!(config.concurrent_lease(), Duration::from_secs(30));
    }

    #[test]
    fn lease_falls_back_to_concurrent_timeout() {
        let config = LimiterConfig {
            concurrent_timeout: Duration::from_millis(250),
            ..LimiterConfig::new("search")
        };

        assert_eq!(config.concurrent_lease(), Duration::from_millis(250));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let toml = indoc! {r#"
            identity = "orders:create"
            max_concurrent = 8
            max_permit_request = 50
            burst = 3
        "#};

        let result: Result<LimiterConfig, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn zero_timeout_is_invalid() {
        let config = LimiterConfig {
            request_timeout: Duration::ZERO,
            ..LimiterConfig::new("search")
        };

        let error = config.validate().unwrap_err().to_string();
        assert_eq!(error, "Limiter 'search': request_timeout must be greater than zero");
    }

    #[test]
    fn reserve_above_hundred_percent_is_invalid() {
        let mut config = LimiterConfig::new("search");
        config.rate.reserved_percent = 120;

        let error = config.validate().unwrap_err().to_string();
        assert_eq!(
            error,
            "Limiter 'search': reserved_percent must be between 0 and 100, got 120"
        );
    }

    #[test]
    fn blank_identity_is_invalid() {
        let error = LimiterConfig::new("  ").validate().unwrap_err().to_string();
        assert_eq!(error, "Limiter identity must not be empty");
    }

    #[test]
    fn oversized_request_is_reported() {
        let mut config = LimiterConfig {
            max_concurrent: 1,
            max_permit_request: 5,
            ..LimiterConfig::new("search")
        };
        config.rate.permits = 10;

        assert_debug_snapshot!(config.warnings(), @r#"
        [
            "Limiter 'search' requests 10 permits per acquisition but the bucket only holds 5",
        ]
        "#);
    }
}
