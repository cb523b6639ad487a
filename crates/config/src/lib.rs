//! Neural configuration structures to map the neural.toml configuration.

#![deny(missing_docs)]

mod limiter;
mod loader;
mod storage;

use std::path::Path;

pub use limiter::{LimiterConfig, RateConfig};
use serde::Deserialize;
pub use storage::*;

/// Main configuration structure for the limiter client.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Backend holding the shared counter state.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Per-resource limiter settings.
    #[serde(default)]
    pub limiters: Vec<LimiterConfig>,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> anyhow::Result<Config> {
        loader::parse(content)
    }

    /// Validates every limiter and checks that identities are unique.
    pub fn validate(&self) -> anyhow::Result<()> {
        loader::validate(self)
    }

    /// Finds the limiter configured for `identity`.
    pub fn limiter(&self, identity: &str) -> Option<&LimiterConfig> {
        self.limiters.iter().find(|limiter| limiter.identity == identity)
    }
}
