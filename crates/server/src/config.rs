use std::path::Path;

use anyhow::{Context, Result};
use beacon_protocol::{BeaconConfig, Environment};

/// Load configuration from a TOML file at the given path.
/// If the file doesn't exist, returns default configuration.
///
/// The `ENVIRONMENT` env var overrides the configured environment so the
/// deployment scripts can flip a host to production without editing the
/// config file.
pub fn load_config(path: &Path) -> Result<BeaconConfig> {
    let mut config = if path.exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: BeaconConfig =
            toml::from_str(&contents).with_context(|| "Failed to parse config TOML")?;
        tracing::info!("Loaded config from {}", path.display());
        config
    } else {
        tracing::warn!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        BeaconConfig::default()
    };

    if let Ok(value) = std::env::var("ENVIRONMENT")
        && !value.is_empty()
    {
        config.environment = Environment::from_env_var(&value);
        tracing::info!(environment = ?config.environment, "environment set from ENVIRONMENT var");
    }

    Ok(config)
}
