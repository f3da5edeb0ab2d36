use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Sample host server settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// `text` or `json`
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

/// Capture middleware settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureConfig {
    /// Initial state of the enable switch (default: true)
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Mount point of the admin API, always excluded from capture
    #[serde(default = "default_base_path")]
    pub base_path: String,

    /// Extra path prefixes excluded on top of the defaults
    #[serde(default)]
    pub exclude_paths: Vec<String>,

    /// Largest request/response body buffered for capture (default: 1 MiB)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Concurrent database writes allowed to the background writer (default: 16)
    #[serde(default = "default_max_concurrent_writes")]
    pub max_concurrent_writes: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            base_path: default_base_path(),
            exclude_paths: Vec::new(),
            max_body_bytes: default_max_body_bytes(),
            max_concurrent_writes: default_max_concurrent_writes(),
        }
    }
}

/// Request log database settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// SQLite database path or URL (default: "./data/reqtrail.db")
    #[serde(default = "default_database_path")]
    pub database_path: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Queries slower than this are logged at WARN (default: 1000)
    #[serde(default = "default_slow_query_threshold_ms")]
    pub slow_query_threshold_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            max_connections: default_max_connections(),
            slow_query_threshold_ms: default_slow_query_threshold_ms(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_base_path() -> String {
    "/reqtrail".to_string()
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_max_concurrent_writes() -> usize {
    16
}

fn default_database_path() -> String {
    "./data/reqtrail.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_slow_query_threshold_ms() -> u64 {
    1000
}

/// Load configuration from `path` (optional) and `REQTRAIL__*` environment
/// variables, then validate it.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(config::Environment::with_prefix("REQTRAIL").separator("__"))
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if !cfg.capture.base_path.starts_with('/') || cfg.capture.base_path.len() < 2 {
        anyhow::bail!(
            "capture.base_path must start with '/' and not be the root: {:?}",
            cfg.capture.base_path
        );
    }

    if cfg.capture.base_path.ends_with('/') {
        anyhow::bail!("capture.base_path must not end with '/'");
    }

    if cfg.capture.max_body_bytes == 0 {
        anyhow::bail!("capture.max_body_bytes must be greater than 0");
    }

    if cfg.capture.max_concurrent_writes == 0 {
        anyhow::bail!("capture.max_concurrent_writes must be greater than 0");
    }

    for path in &cfg.capture.exclude_paths {
        if !path.starts_with('/') {
            anyhow::bail!("Exclude path '{}' must start with '/'", path);
        }
    }

    if cfg.storage.max_connections == 0 {
        anyhow::bail!("storage.max_connections must be greater than 0");
    }

    if cfg.storage.database_path.is_empty() {
        anyhow::bail!("storage.database_path cannot be empty");
    }

    match cfg.server.log_format.as_str() {
        "text" | "json" => {}
        other => anyhow::bail!("Invalid server.log_format '{}': expected text or json", other),
    }

    Ok(())
}
