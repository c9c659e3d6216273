mod cli;
mod commands;
mod config;
mod console;
mod error;
mod openai;
mod output;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Log to a file so console output stays clean
    let _guard = init_logging(&cli);

    if let Err(err) = run(cli).await {
        error::handle_error(err);
    }
}

fn init_logging(cli: &Cli) -> Option<WorkerGuard> {
    let log_dir = config::log_dir(cli);
    std::fs::create_dir_all(&log_dir).ok()?;

    let file_appender = tracing_appender::rolling::daily(log_dir, "chatrelay.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .init();

    Some(guard)
}

async fn run(cli: Cli) -> Result<()> {
    let config = config::load(&cli)?;

    match cli.command {
        Commands::Chat(args) => commands::chat::run(&config, args).await,
        Commands::Templates { command } => commands::templates::run(&config, command, cli.format),
        Commands::Split(args) => {
            commands::split::run(args, config.conversation.max_chunk_len, cli.format)
        }
        Commands::Config { command } => commands::config::run(&config, command, cli.format),
    }
}
