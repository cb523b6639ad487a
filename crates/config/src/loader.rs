use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, anyhow};
use indoc::formatdoc;

use crate::Config;

pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

    parse(&content)
}

pub fn parse(content: &str) -> anyhow::Result<Config> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;

    for warning in collect_warnings(&config) {
        log::warn!("{warning}");
    }

    Ok(config)
}

pub(crate) fn validate(config: &Config) -> anyhow::Result<()> {
    let mut identities = BTreeSet::new();

    for limiter in &config.limiters {
        limiter.validate()?;

        if !identities.insert(limiter.identity.as_str()) {
            return Err(anyhow!(formatdoc! {r#"
                Limiter identity '{identity}' is configured more than once.

                Each [[limiters]] entry must protect a distinct resource, because limiters
                sharing an identity would also share their counters in the store.
            "#, identity = limiter.identity}));
        }
    }

    Ok(())
}

pub(crate) fn collect_warnings(config: &Config) -> Vec<String> {
    let mut warnings: Vec<String> = config.limiters.iter().flat_map(|limiter| limiter.warnings()).collect();

    if config.limiters.is_empty() {
        warnings.push("No limiters configured".to_string());
    }

    warnings
}
