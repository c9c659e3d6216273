//! Console chat session
//!
//! Plain lines are chat turns; lines starting with `/` are behavior
//! commands. Replies and status messages go to stdout, the prompt banner to
//! stderr.

use std::sync::Arc;

use anyhow::Result;
use chatrelay_core::{
    ConversationController, ConversationKey, FileTemplateStore, InboundMessage, RelayConfig,
    RelayError, Transport,
};
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::cli::ChatArgs;
use crate::commands::build_client;
use crate::console::ConsoleTransport;

const HELP: &str = "\
/wipe            clear the conversation, keep the current behavior
/reset           restore the default behavior
/load NAME       load a saved behavior
/save NAME       save the conversation as a behavior
/behavior TEXT   replace the conversation with TEXT
/templates       list saved behaviors
/quit            leave";

#[derive(Debug, PartialEq, Eq)]
enum ReplCommand {
    Say(String),
    Wipe,
    Reset,
    Load(String),
    Save(String),
    Behavior(String),
    Templates,
    Help,
    Quit,
    Unknown(String),
}

fn parse_line(line: &str) -> Option<ReplCommand> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(ReplCommand::Say(line.to_string()));
    };

    let (name, argument) = match rest.split_once(char::is_whitespace) {
        Some((name, argument)) => (name, argument.trim().to_string()),
        None => (rest, String::new()),
    };

    let command = match name.to_ascii_lowercase().as_str() {
        "wipe" => ReplCommand::Wipe,
        "reset" => ReplCommand::Reset,
        "load" if !argument.is_empty() => ReplCommand::Load(argument),
        "save" if !argument.is_empty() => ReplCommand::Save(argument),
        "behavior" if !argument.is_empty() => ReplCommand::Behavior(argument),
        "templates" => ReplCommand::Templates,
        "help" => ReplCommand::Help,
        "quit" | "exit" => ReplCommand::Quit,
        _ => ReplCommand::Unknown(line.to_string()),
    };
    Some(command)
}

pub async fn run(config: &RelayConfig, args: ChatArgs) -> Result<()> {
    let client = build_client(config)?;
    let templates = Arc::new(FileTemplateStore::new(&config.conversation.templates_dir));
    let controller = ConversationController::from_config(config, client, templates)?;
    let transport = ConsoleTransport;

    let key = ConversationKey::resolve(&args.channel, &args.user, args.mention);
    info!(%key, provider = ?config.completion.provider, "Console chat started");
    eprintln!(
        "{}",
        format!(
            "chatrelay {} - behavior `{}` - /help for commands",
            key,
            controller.active_template()
        )
        .dimmed()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let Some(command) = parse_line(&line) else {
            continue;
        };

        let reply = match command {
            ReplCommand::Quit => break,
            ReplCommand::Say(text) => {
                let mut message = InboundMessage::new(&args.channel, &args.user, text);
                if args.mention {
                    message = message.as_mention();
                }
                controller.respond(&message, &transport).await;
                continue;
            }
            ReplCommand::Wipe => controller.wipe(&key).await.map(|_| "Memory wiped.".to_string()),
            ReplCommand::Reset => controller
                .reset(&key)
                .await
                .map(|template| format!("Behavior reset to `{}`.", template.name)),
            ReplCommand::Load(name) => controller
                .load_behavior(&key, &name)
                .await
                .map(|template| format!("Behavior `{}` loaded.", template.name)),
            ReplCommand::Save(name) => controller
                .save_behavior(&key, &name)
                .await
                .map(|text| format!("Behavior saved as `{}`:\n{text}", name.trim())),
            ReplCommand::Behavior(text) => controller
                .new_behavior(&key, &text)
                .await
                .map(|_| "Behavior updated.".to_string()),
            ReplCommand::Templates => controller
                .available_templates()
                .await
                .map(|names| format!("Available behaviors: {}", names.join(", "))),
            ReplCommand::Help => Ok(HELP.to_string()),
            ReplCommand::Unknown(line) => Ok(format!("Unknown command: {line} (try /help)")),
        };

        let text = reply.unwrap_or_else(|error: RelayError| error.user_message());
        transport.send(&args.channel, &text).await?;
    }

    Ok(())
}
