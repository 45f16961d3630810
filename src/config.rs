use serde::Deserialize;
use std::{error::Error, fs, path::Path};
use tracing::info;

fn default_pool_size() -> usize {
    10
}

fn default_probe_timeout_ms() -> u64 {
    3000
}

fn default_trigger_path() -> String {
    "/var/spool/mdaemon".to_string()
}

#[derive(Deserialize, Debug, Clone)]
pub struct AgentConfig {
    /// Postgres connection string; `DATABASE_URL` in the environment
    /// takes precedence over the file.
    #[serde(default)]
    pub database_url: String,
    #[serde(default = "default_pool_size")]
    pub scheduler_pool_size: usize,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_trigger_path")]
    pub mdaemon_trigger_path: String,
}

pub fn load_config(config_path_str: &str) -> Result<AgentConfig, Box<dyn Error>> {
    let config_path = Path::new(config_path_str);
    let config_str = fs::read_to_string(config_path)
        .map_err(|e| format!("Failed to read config file '{config_path_str}': {e}"))?;

    let mut config: AgentConfig = toml::from_str(&config_str)
        .map_err(|e| format!("Failed to parse config file '{config_path_str}': {e}"))?;

    if let Ok(url) = std::env::var("DATABASE_URL") {
        config.database_url = url;
    }
    if config.database_url.is_empty() {
        return Err("database_url must be set in the config file or via DATABASE_URL".into());
    }

    info!(
        pool_size = config.scheduler_pool_size,
        probe_timeout_ms = config.probe_timeout_ms,
        "Loaded agent config"
    );
    Ok(config)
}
