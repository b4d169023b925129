//! Run-configuration loading: TOML file, then flag overrides, then validation.

use std::path::Path;

use anyhow::{Context, Result};
use pipeline::{PlanningMode, RunConfig};

/// Flag values that take precedence over the configuration file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub concurrency: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub planning: Option<PlanningMode>,
}

/// Reads `path` (when given) over the defaults, applies `overrides` and
/// validates the result.
pub fn load_config(path: Option<&Path>, overrides: &Overrides) -> Result<RunConfig> {
    let mut config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            parse_config(&text)
                .with_context(|| format!("failed to parse config file {}", path.display()))?
        }
        None => RunConfig::default(),
    };

    if let Some(concurrency) = overrides.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(timeout) = overrides.timeout_secs {
        config.run_timeout_secs = timeout;
    }
    if let Some(planning) = overrides.planning {
        config.planning = planning;
    }

    config.validate()?;
    Ok(config)
}

fn parse_config(text: &str) -> Result<RunConfig, toml::de::Error> {
    toml::from_str(text)
}
