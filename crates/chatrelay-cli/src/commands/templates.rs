use anyhow::Result;
use chatrelay_core::{FileTemplateStore, RelayConfig, RelayError, TemplateStore};
use colored::Colorize;
use serde_json::json;

use crate::cli::TemplateCommands;
use crate::output::{OutputFormat, print_json};

pub fn run(config: &RelayConfig, command: TemplateCommands, format: OutputFormat) -> Result<()> {
    let store = FileTemplateStore::new(&config.conversation.templates_dir);
    match command {
        TemplateCommands::List => list_templates(&store, format),
        TemplateCommands::Show { name } => show_template(config, &store, &name, format),
    }
}

fn list_templates(store: &FileTemplateStore, format: OutputFormat) -> Result<()> {
    let names = store.list()?;

    if format.is_json() {
        return print_json(&json!({ "templates": names }));
    }

    if names.is_empty() {
        println!("No templates in {}", store.dir().display());
        return Ok(());
    }
    for name in names {
        println!("{name}");
    }
    Ok(())
}

fn show_template(
    config: &RelayConfig,
    store: &FileTemplateStore,
    name: &str,
    format: OutputFormat,
) -> Result<()> {
    let found = store
        .find(name)?
        .ok_or_else(|| RelayError::TemplateNotFound(name.trim().to_string()))?;
    let template = store.load(&found)?;
    let counter = config.token_counter()?;
    let tokens = counter.count(&template.messages);

    if format.is_json() {
        return print_json(&json!({
            "name": template.name,
            "messages": template.messages,
            "tokens": tokens,
            "counting_model": counter.model(),
        }));
    }

    println!("{}", template.to_text());
    println!(
        "{}",
        format!(
            "-- {}: {} messages, {} tokens ({})",
            template.name,
            template.messages.len(),
            tokens,
            counter.model()
        )
        .dimmed()
    );
    Ok(())
}
