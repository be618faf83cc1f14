use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use brick_config::ConfigManager;
use brick_gateway::Gateway;
use brick_responder::KeywordResponder;
use brick_server::{gateway_config, init_logging, open_message_log, Overrides};
use clap::Parser;
use tracing::{debug, info, warn};

#[derive(Parser, Debug, Clone)]
#[command(name = "brick-server")]
#[command(about = "Brick support chat server")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(long, env = "DEBUG", default_value = "false")]
    debug: bool,

    /// Listen address (overrides config)
    #[arg(long, env = "BRICK_BIND")]
    bind: Option<String>,

    /// Message log backend: memory or jsonl (overrides config)
    #[arg(long)]
    storage: Option<String>,

    /// JSONL message log path (overrides config)
    #[arg(long)]
    storage_path: Option<String>,

    /// Log level (overrides config)
    #[arg(long)]
    log_level: Option<String>,

    /// Config file path
    #[arg(long, env = "BRICK_CONFIG", default_value = "~/.brick/config.json")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path =
        brick_config::expand_tilde(&cli.config).unwrap_or_else(|| PathBuf::from(&cli.config));

    if let Err(e) = brick_config::init_brick_dirs().await {
        eprintln!("Warning: Failed to init brick directories: {}", e);
    }

    let config_manager = ConfigManager::load(&config_path)
        .await
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    let mut config = config_manager.snapshot().await;

    Overrides {
        bind: cli.bind.clone(),
        storage: cli.storage.clone(),
        storage_path: cli.storage_path.clone(),
    }
    .apply(&mut config)?;

    let level_override = if cli.debug {
        Some("debug")
    } else {
        cli.log_level.as_deref()
    };
    let _log_guard = init_logging(&config.logging, level_override)?;

    info!("Starting Brick server, config {:?}", config_path);
    debug!("  Storage: {}", config.storage.storage_type.as_str());
    debug!("  History limit: {}", config.chat.history_limit);
    debug!("  Liveness interval: {}s", config.chat.liveness_interval_secs);

    let log = open_message_log(&config.storage).await?;
    let gateway = Gateway::new(
        gateway_config(&config),
        log,
        Arc::new(KeywordResponder::new()),
    );

    let signal_gateway = gateway.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => signal_gateway.shutdown(),
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    gateway.run().await?;

    let stats = gateway.stats();
    info!(
        active_connections = stats.active_connections,
        joined_users = stats.joined_users,
        "Brick server stopped"
    );
    Ok(())
}
