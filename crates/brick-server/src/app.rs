use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use brick_config::{Config, ConfigManager, StorageConfig, StorageType};
use brick_gateway::{GatewayConfig, RouterSettings};
use brick_session::{JsonlStorage, MemoryStorage, MessageLog};
use tracing::info;

/// Command-line values that win over the config file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub bind: Option<String>,
    pub storage: Option<String>,
    pub storage_path: Option<String>,
}

impl Overrides {
    /// Apply on top of `config` and re-validate the result
    pub fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(bind) = &self.bind {
            config.server.bind = bind.clone();
        }
        if let Some(storage) = &self.storage {
            config.storage.storage_type = storage.parse()?;
        }
        if let Some(path) = &self.storage_path {
            config.storage.path = Some(path.clone());
        }
        ConfigManager::validate(config)?;
        Ok(())
    }
}

/// Map the `server` and `chat` sections onto the gateway's settings
pub fn gateway_config(config: &Config) -> GatewayConfig {
    let chat = &config.chat;
    GatewayConfig {
        bind: config.server.bind.clone(),
        path: config.server.path.clone(),
        max_connections: config.server.max_connections,
        liveness_interval: chat.liveness_interval(),
        router: RouterSettings {
            history_limit: chat.history_limit,
            reply_delay_min: Duration::from_millis(chat.reply_delay_min_ms),
            reply_delay_max: Duration::from_millis(chat.reply_delay_max_ms),
            responder_timeout: chat.responder_timeout(),
            close_superseded: chat.close_superseded,
        },
    }
}

/// Open the configured message log
pub async fn open_message_log(storage: &StorageConfig) -> Result<Arc<dyn MessageLog>> {
    match storage.storage_type {
        StorageType::Memory => {
            info!("Using in-memory message log");
            Ok(Arc::new(MemoryStorage::new()))
        }
        StorageType::Jsonl => {
            let raw = storage
                .path
                .as_deref()
                .context("storage.path is required for jsonl storage")?;
            let path = brick_config::expand_tilde(raw).unwrap_or_else(|| PathBuf::from(raw));
            let log = JsonlStorage::open(&path)
                .await
                .with_context(|| format!("Failed to open message log at {:?}", path))?;
            info!("Using JSONL message log at {:?}", path);
            Ok(Arc::new(log))
        }
    }
}
