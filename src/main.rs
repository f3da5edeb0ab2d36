use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use reqtrail::{config, init_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    // Logging settings come from the config file when it loads; commands
    // that report config errors still need a subscriber.
    let (level, format) = match config::load_config(&args.config) {
        Ok(cfg) => (cfg.server.log_level, cfg.server.log_format),
        Err(_) => ("info".to_string(), "text".to_string()),
    };
    init_tracing(&level, &format);

    match args.get_command() {
        cli::Commands::Start => {
            commands::start::execute(&args.config).await?;
        }
        cli::Commands::Config { action } => match action {
            cli::ConfigCommands::Show => commands::config::show(&args.config)?,
            cli::ConfigCommands::Validate => commands::config::validate(&args.config)?,
        },
        cli::Commands::Entries { action } => match action {
            cli::EntriesCommands::List {
                page,
                limit,
                format,
            } => commands::entries::list(&args.config, page, limit, &format).await?,
            cli::EntriesCommands::Show { id, format } => {
                commands::entries::show(&args.config, &id, &format).await?
            }
            cli::EntriesCommands::Clear => commands::entries::clear(&args.config).await?,
        },
        cli::Commands::Version => {
            println!("reqtrail v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
