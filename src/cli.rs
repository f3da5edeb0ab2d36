use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "reqtrail", version, about = "Request capture with SQL query correlation")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "reqtrail.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the sample server with request capture installed (default)
    Start,

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Inspect captured requests
    Entries {
        #[command(subcommand)]
        action: EntriesCommands,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Display the effective configuration
    Show,

    /// Validate configuration file
    Validate,
}

#[derive(Subcommand, Debug, Clone)]
pub enum EntriesCommands {
    /// List captured requests, newest first
    List {
        /// Page number (1-based)
        #[arg(short, long, default_value = "1")]
        page: u32,

        /// Entries per page (1-100)
        #[arg(short, long, default_value = "20")]
        limit: u32,

        /// Output format (text, json)
        #[arg(short = 'f', long, default_value = "text")]
        format: String,
    },

    /// Show one captured request with its queries
    Show {
        /// Entry id (UUID)
        id: String,

        /// Output format (text, json)
        #[arg(short = 'f', long, default_value = "text")]
        format: String,
    },

    /// Delete every captured request
    Clear,
}

impl Cli {
    /// Get the command to execute, defaulting to Start if none provided
    pub fn get_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Start)
    }
}
