use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            server: ServerConfig::default(),
            chat: ChatConfig::default(),
            client: ClientConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Look up a value by dotted key, e.g. `chat.history_limit`
    pub fn get_value(&self, key: &str) -> Option<String> {
        let parts: Vec<&str> = key.split('.').collect();
        match parts.as_slice() {
            ["version"] => Some(self.version.clone()),
            ["server", "bind"] => Some(self.server.bind.clone()),
            ["server", "path"] => Some(self.server.path.clone()),
            ["server", "max_connections"] => Some(self.server.max_connections.to_string()),
            ["chat", "history_limit"] => Some(self.chat.history_limit.to_string()),
            ["chat", "liveness_interval_secs"] => {
                Some(self.chat.liveness_interval_secs.to_string())
            }
            ["chat", "reply_delay_min_ms"] => Some(self.chat.reply_delay_min_ms.to_string()),
            ["chat", "reply_delay_max_ms"] => Some(self.chat.reply_delay_max_ms.to_string()),
            ["chat", "responder_timeout_ms"] => Some(self.chat.responder_timeout_ms.to_string()),
            ["chat", "close_superseded"] => Some(self.chat.close_superseded.to_string()),
            ["client", "reconnect_delay_ms"] => Some(self.client.reconnect_delay_ms.to_string()),
            ["client", "typing_timeout_ms"] => Some(self.client.typing_timeout_ms.to_string()),
            ["client", "fallback_delay_ms"] => Some(self.client.fallback_delay_ms.to_string()),
            ["storage", "type"] => Some(self.storage.storage_type.as_str().to_string()),
            ["storage", "path"] => self.storage.path.clone(),
            ["logging", "level"] => Some(self.logging.level.as_str().to_string()),
            ["logging", "json"] => Some(self.logging.json.to_string()),
            ["logging", "file"] => self.logging.file.clone(),
            _ => None,
        }
    }

    /// Set a value by dotted key
    pub fn set_value(&mut self, key: &str, value: &str) -> ConfigResult<()> {
        let parts: Vec<&str> = key.split('.').collect();
        match parts.as_slice() {
            ["server", "bind"] => self.server.bind = value.to_string(),
            ["server", "path"] => self.server.path = value.to_string(),
            ["server", "max_connections"] => self.server.max_connections = parse_number(value)?,
            ["chat", "history_limit"] => self.chat.history_limit = parse_number(value)?,
            ["chat", "liveness_interval_secs"] => {
                self.chat.liveness_interval_secs = parse_number(value)?
            }
            ["chat", "reply_delay_min_ms"] => self.chat.reply_delay_min_ms = parse_number(value)?,
            ["chat", "reply_delay_max_ms"] => self.chat.reply_delay_max_ms = parse_number(value)?,
            ["chat", "responder_timeout_ms"] => {
                self.chat.responder_timeout_ms = parse_number(value)?
            }
            ["chat", "close_superseded"] => self.chat.close_superseded = parse_bool(value)?,
            ["client", "reconnect_delay_ms"] => {
                self.client.reconnect_delay_ms = parse_number(value)?
            }
            ["client", "typing_timeout_ms"] => self.client.typing_timeout_ms = parse_number(value)?,
            ["client", "fallback_delay_ms"] => self.client.fallback_delay_ms = parse_number(value)?,
            ["storage", "type"] => self.storage.storage_type = value.parse()?,
            ["storage", "path"] => self.storage.path = Some(value.to_string()),
            ["logging", "level"] => self.logging.level = value.parse()?,
            ["logging", "json"] => self.logging.json = parse_bool(value)?,
            ["logging", "file"] => self.logging.file = Some(value.to_string()),
            _ => return Err(ConfigError::KeyNotFound(key.to_string())),
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(value: &str) -> ConfigResult<T> {
    value
        .parse()
        .map_err(|_| ConfigError::Validation(format!("Invalid number: {}", value)))
}

fn parse_bool(value: &str) -> ConfigResult<bool> {
    value
        .parse()
        .map_err(|_| ConfigError::Validation(format!("Invalid boolean: {}", value)))
}

/// WebSocket listener settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:8090")
    pub bind: String,
    /// Upgrade path accepted for chat channels
    pub path: String,
    /// Maximum number of concurrent channels
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8090".to_string(),
            path: "/ws".to_string(),
            max_connections: 1000,
        }
    }
}

/// Server-side chat behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatConfig {
    /// Number of past turns sent in reply to `join`
    pub history_limit: usize,
    /// Period of the liveness sweep
    pub liveness_interval_secs: u64,
    /// Lower bound of the AI reply delay
    pub reply_delay_min_ms: u64,
    /// Upper bound (exclusive) of the AI reply delay
    pub reply_delay_max_ms: u64,
    /// Budget for a single response generation
    pub responder_timeout_ms: u64,
    /// Close the previous channel when a user joins again elsewhere
    #[serde(default)]
    pub close_superseded: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_limit: 20,
            liveness_interval_secs: 30,
            reply_delay_min_ms: 1000,
            reply_delay_max_ms: 3000,
            responder_timeout_ms: 5000,
            close_superseded: false,
        }
    }
}

impl ChatConfig {
    pub fn liveness_interval(&self) -> Duration {
        Duration::from_secs(self.liveness_interval_secs)
    }

    pub fn responder_timeout(&self) -> Duration {
        Duration::from_millis(self.responder_timeout_ms)
    }
}

/// Client channel controller timings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    pub reconnect_delay_ms: u64,
    pub typing_timeout_ms: u64,
    pub fallback_delay_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: 3000,
            typing_timeout_ms: 3000,
            fallback_delay_ms: 1000,
        }
    }
}

/// Storage backend for the message log
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Memory,
    #[default]
    Jsonl,
}

impl StorageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageType::Memory => "memory",
            StorageType::Jsonl => "jsonl",
        }
    }
}

impl std::str::FromStr for StorageType {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StorageType::Memory),
            "jsonl" => Ok(StorageType::Jsonl),
            _ => Err(ConfigError::Validation(format!("Invalid storage type: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    pub path: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::Jsonl,
            path: Some("~/.brick/chat/messages.jsonl".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(ConfigError::Validation(format!("Invalid log level: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// Emit JSON lines instead of human readable output
    #[serde(default)]
    pub json: bool,
    /// Directory-qualified log file; rotated daily
    pub file: Option<String>,
    /// Per-module overrides, e.g. `{"brick_gateway": "debug"}`
    #[serde(default)]
    pub module_levels: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json: false,
            file: None,
            module_levels: HashMap::new(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
