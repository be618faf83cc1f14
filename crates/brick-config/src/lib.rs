pub mod config;
pub mod manager;

pub use config::{
    ChatConfig, ClientConfig, Config, ConfigError, ConfigResult, LogLevel, LoggingConfig,
    ServerConfig, StorageConfig, StorageType,
};
pub use manager::ConfigManager;

use std::path::PathBuf;

/// Root directory for Brick state (`~/.brick`)
pub fn brick_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".brick"))
}

/// Default configuration file path
pub fn default_config_path() -> Option<PathBuf> {
    brick_dir().map(|dir| dir.join("config.json"))
}

/// Create the standard directory layout under `~/.brick`
pub async fn init_brick_dirs() -> ConfigResult<()> {
    if let Some(brick) = brick_dir() {
        tokio::fs::create_dir_all(brick.join("chat")).await?;
        tokio::fs::create_dir_all(brick.join("logs")).await?;
    }
    Ok(())
}

/// Expand a leading `~/` to the home directory
pub fn expand_tilde(path: &str) -> Option<PathBuf> {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir().map(|home| home.join(rest))
    } else {
        Some(PathBuf::from(path))
    }
}
