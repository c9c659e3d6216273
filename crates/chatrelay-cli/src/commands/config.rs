use anyhow::Result;
use chatrelay_core::RelayConfig;
use serde_json::json;

use crate::cli::ConfigCommands;
use crate::config::default_path;
use crate::output::{OutputFormat, print_json};

pub fn run(config: &RelayConfig, command: ConfigCommands, format: OutputFormat) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            if format.is_json() {
                return print_json(config);
            }
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
        ConfigCommands::Path => {
            let path = default_path().map(|p| p.display().to_string());
            if format.is_json() {
                return print_json(&json!({ "path": path }));
            }
            println!("{}", path.unwrap_or_else(|| "-".to_string()));
            Ok(())
        }
    }
}
