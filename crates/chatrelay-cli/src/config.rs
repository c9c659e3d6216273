//! Configuration loading for the CLI
//!
//! Reads `~/.config/chatrelay/config.toml` (or `--config`), then applies
//! command-line and environment overrides.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chatrelay_core::{CompletionProvider, RelayConfig};

use crate::cli::{Cli, ProviderArg};

/// Get the default configuration file path
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("chatrelay").join("config.toml"))
}

/// Directory for rolling log files
pub fn log_dir(cli: &Cli) -> PathBuf {
    cli.log_dir.clone().unwrap_or_else(|| {
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("chatrelay")
            .join("logs")
    })
}

/// Load the effective configuration.
///
/// An explicit `--config` must exist; the default path is optional.
pub fn load(cli: &Cli) -> Result<RelayConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            if !path.exists() {
                bail!("Config file not found: {}", path.display());
            }
            RelayConfig::load_from_path(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None => match default_path() {
            Some(path) => RelayConfig::load_from_path(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => RelayConfig::default(),
        },
    };

    apply_overrides(&mut config, cli);
    config.validate()?;
    Ok(config)
}

fn apply_overrides(config: &mut RelayConfig, cli: &Cli) {
    if let Some(dir) = &cli.templates_dir {
        config.conversation.templates_dir = dir.clone();
    }
    if let Some(provider) = cli.provider {
        config.completion.provider = match provider {
            ProviderArg::Openai => CompletionProvider::OpenAi,
            ProviderArg::Echo => CompletionProvider::Echo,
        };
    }
    if let Some(key) = &cli.api_key
        && !key.is_empty()
    {
        config.completion.api_key = Some(key.clone());
    }
}
