use crate::config::{Config, ConfigError, ConfigResult, StorageType};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Loads, validates and persists the configuration file
#[derive(Debug, Clone)]
pub struct ConfigManager {
    path: PathBuf,
    config: Arc<RwLock<Config>>,
}

impl ConfigManager {
    /// Load the file at `path`, writing a default one if it does not exist
    pub async fn load(path: &Path) -> ConfigResult<Self> {
        let config = if path.exists() {
            info!("Loading config from {:?}", path);
            let content = tokio::fs::read_to_string(path).await?;
            let content = Self::expand_env_vars(&content)?;
            let config: Config = serde_json::from_str(&content)?;
            Self::validate(&config)?;
            config
        } else {
            info!("Config file not found, creating default config at {:?}", path);
            let default_config = Config::default();
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let content = serde_json::to_string_pretty(&default_config)?;
            tokio::fs::write(path, &content).await?;
            default_config
        };

        Ok(Self {
            path: path.to_path_buf(),
            config: Arc::new(RwLock::new(config)),
        })
    }

    /// Load from `~/.brick/config.json`
    pub async fn load_default() -> ConfigResult<Self> {
        let config_path = crate::default_config_path()
            .ok_or_else(|| ConfigError::InvalidPath("Could not find home directory".to_string()))?;
        Self::load(&config_path).await
    }

    /// Wrap an in-memory config (used by tests and embedders)
    pub fn new(config: Config, path: PathBuf) -> Self {
        Self {
            path,
            config: Arc::new(RwLock::new(config)),
        }
    }

    pub fn get(&self) -> Arc<RwLock<Config>> {
        Arc::clone(&self.config)
    }

    /// Clone of the current configuration
    pub async fn snapshot(&self) -> Config {
        self.config.read().await.clone()
    }

    pub async fn save(&self) -> ConfigResult<()> {
        let content = {
            let config = self.config.read().await;
            serde_json::to_string_pretty(&*config)?
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&self.path, content).await?;
        info!("Config saved to {:?}", self.path);
        Ok(())
    }

    /// Re-read the file, keeping the current config if the new one is invalid
    pub async fn reload(&self) -> ConfigResult<()> {
        if !self.path.exists() {
            return Err(ConfigError::InvalidPath(format!(
                "Config file not found: {:?}",
                self.path
            )));
        }

        let content = tokio::fs::read_to_string(&self.path).await?;
        let content = Self::expand_env_vars(&content)?;
        let new_config: Config = serde_json::from_str(&content)?;
        Self::validate(&new_config)?;

        *self.config.write().await = new_config;
        info!("Config reloaded from {:?}", self.path);
        Ok(())
    }

    /// Apply `f`, validate the result and persist it
    pub async fn update<F>(&self, f: F) -> ConfigResult<()>
    where
        F: FnOnce(&mut Config) -> ConfigResult<()>,
    {
        {
            let mut config = self.config.write().await;
            let mut candidate = config.clone();
            f(&mut candidate)?;
            Self::validate(&candidate)?;
            *config = candidate;
        }
        self.save().await
    }

    pub fn validate(config: &Config) -> ConfigResult<()> {
        if config.server.bind.trim().is_empty() {
            return Err(ConfigError::Validation(
                "server.bind cannot be empty".to_string(),
            ));
        }

        if !config.server.path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "server.path must start with '/': {}",
                config.server.path
            )));
        }

        if config.server.max_connections == 0 {
            return Err(ConfigError::Validation(
                "server.max_connections must be greater than 0".to_string(),
            ));
        }

        if config.chat.history_limit == 0 {
            return Err(ConfigError::Validation(
                "chat.history_limit must be greater than 0".to_string(),
            ));
        }

        if config.chat.liveness_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "chat.liveness_interval_secs must be greater than 0".to_string(),
            ));
        }

        if config.chat.reply_delay_min_ms > config.chat.reply_delay_max_ms {
            return Err(ConfigError::Validation(format!(
                "chat.reply_delay_min_ms ({}) exceeds chat.reply_delay_max_ms ({})",
                config.chat.reply_delay_min_ms, config.chat.reply_delay_max_ms
            )));
        }

        if config.chat.responder_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "chat.responder_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if config.storage.storage_type == StorageType::Jsonl && config.storage.path.is_none() {
            return Err(ConfigError::Validation(
                "storage.path is required for jsonl storage".to_string(),
            ));
        }

        Ok(())
    }

    /// Expand `${VAR}` and `${VAR:-default}`
    fn expand_env_vars(content: &str) -> ConfigResult<String> {
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| ConfigError::Validation(format!("Invalid pattern: {}", e)))?;
        let mut result = content.to_string();

        for cap in re.captures_iter(content) {
            let full_match = &cap[0];
            let var_expr = &cap[1];

            let (var_name, default_value) = match var_expr.split_once(":-") {
                Some((name, default)) => (name, Some(default)),
                None => (var_expr, None),
            };

            let replacement = match std::env::var(var_name) {
                Ok(val) => val,
                Err(_) => match default_value {
                    Some(default) => default.to_string(),
                    None => return Err(ConfigError::EnvVarNotFound(var_name.to_string())),
                },
            };

            result = result.replace(full_match, &replacement);
        }

        Ok(result)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
