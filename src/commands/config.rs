use anyhow::Result;
use colored::Colorize;
use reqtrail::config::{self, Config};
use std::path::Path;
use tracing::info;

/// Execute the config show command
pub fn show(config_path: &Path) -> Result<()> {
    println!("{}", "Loading configuration...".yellow());

    let cfg = config::load_config(config_path)?;

    println!("{}", "Current Configuration:".green().bold());
    println!();
    println!("{}", toml::to_string_pretty(&cfg)?);

    info!("Configuration displayed successfully");
    Ok(())
}

/// Execute the config validate command
pub fn validate(config_path: &Path) -> Result<()> {
    println!(
        "{}",
        format!("Validating {}...", config_path.display()).yellow()
    );

    let cfg = config::load_config(config_path)?;

    println!("{}", "✓ Configuration is valid".green());
    println!();
    println!("{}", "Summary:".bold());
    for line in summary_lines(&cfg) {
        println!("  {}", line);
    }

    info!("Configuration validation successful");
    Ok(())
}

fn summary_lines(cfg: &Config) -> Vec<String> {
    vec![
        format!("Listen: {}:{}", cfg.server.host, cfg.server.port),
        format!(
            "Capture: {}",
            if cfg.capture.enabled { "enabled" } else { "disabled" }
        ),
        format!("Admin API: {}/api", cfg.capture.base_path),
        format!("Extra Exclusions: {}", cfg.capture.exclude_paths.len()),
        format!("Database: {}", cfg.storage.database_path),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_lines() {
        let mut cfg = Config::default();
        cfg.capture.enabled = false;
        cfg.capture.exclude_paths = vec!["/metrics".to_string()];

        let lines = summary_lines(&cfg);
        assert!(lines.contains(&"Capture: disabled".to_string()));
        assert!(lines.contains(&"Admin API: /reqtrail/api".to_string()));
        assert!(lines.contains(&"Extra Exclusions: 1".to_string()));
    }

    #[test]
    fn test_default_config_serializes_to_toml() {
        let rendered = toml::to_string_pretty(&Config::default()).unwrap();
        assert!(rendered.contains("[capture]"));
        assert!(rendered.contains("base_path = \"/reqtrail\""));
    }
}
