use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "chatrelay")]
#[command(version, about = "ChatRelay - relay chat conversations to a language model")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to ~/.config/chatrelay/config.toml)
    #[arg(long, global = true, env = "CHATRELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding behavior templates
    #[arg(long, global = true, env = "CHATRELAY_TEMPLATES_DIR")]
    pub templates_dir: Option<PathBuf>,

    /// Completion provider override
    #[arg(long, global = true, env = "CHATRELAY_PROVIDER")]
    pub provider: Option<ProviderArg>,

    /// OpenAI API key
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Directory for log files
    #[arg(long, global = true, env = "CHATRELAY_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum ProviderArg {
    Openai,
    Echo,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Chat interactively through the console
    Chat(ChatArgs),

    /// Behavior template management
    Templates {
        #[command(subcommand)]
        command: TemplateCommands,
    },

    /// Split text into transport-sized chunks
    Split(SplitArgs),

    /// Show configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Args)]
pub struct ChatArgs {
    /// Channel id the console session speaks in
    #[arg(long, default_value = "console")]
    pub channel: String,

    /// User id the console session speaks as
    #[arg(long, default_value = "console-user")]
    pub user: String,

    /// Treat the session as a mention outside a conversation channel
    #[arg(long)]
    pub mention: bool,
}

#[derive(Subcommand)]
pub enum TemplateCommands {
    /// List persisted templates
    List,

    /// Show a template and its token cost
    Show {
        /// Template name (case-insensitive)
        name: String,
    },
}

#[derive(Args)]
pub struct SplitArgs {
    /// Maximum characters per chunk (defaults to conversation.max_chunk_len)
    #[arg(long)]
    pub max_len: Option<usize>,

    /// File to split (reads stdin when omitted)
    pub file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,

    /// Print the default config file path
    Path,
}
