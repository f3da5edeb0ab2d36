use anyhow::Result;
use colored::Colorize;
use reqtrail::{config, server};
use std::path::Path;
use tracing::info;

/// Execute the start command
pub async fn execute(config_path: &Path) -> Result<()> {
    println!("{}", "Starting reqtrail sample server...".green());

    let cfg = config::load_config(config_path)?;
    info!(
        config = %config_path.display(),
        database = %cfg.storage.database_path,
        "Configuration loaded"
    );

    // Blocks until shutdown
    server::start_server(cfg).await?;

    Ok(())
}
