use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use brick_client::{ChannelController, ChatView, ControllerSettings, WsConnector};
use brick_core::{ChatMessage, Language, Sender};
use brick_session::{JsonlStorage, MessageLog};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "brick-cli")]
#[command(about = "CLI tool for brick chat")]
#[command(version)]
struct Cli {
    /// Enable debug mode
    #[arg(long, short, default_value = "false")]
    debug: bool,

    /// Config file path
    #[arg(long, env = "BRICK_CONFIG", default_value = "~/.brick/config.json")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 启动交互式聊天
    Chat {
        /// Page origin the channel URL is derived from
        #[arg(long, default_value = "http://127.0.0.1:8090")]
        origin: String,
        /// User identifier sent with join
        #[arg(long)]
        user: Option<String>,
        /// Reply language: en or ar
        #[arg(long, default_value = "en")]
        lang: Language,
    },
    /// 查看消息记录
    History {
        /// Only this user's turns
        #[arg(long)]
        user: Option<String>,
        /// Message log file (defaults to storage.path)
        #[arg(long)]
        path: Option<String>,
    },
    /// 配置管理命令
    Config(ConfigArgs),
}

#[derive(Args, Clone)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// 获取配置值
    Get {
        /// 配置键 (如: server.bind, chat.history_limit)
        key: String,
    },
    /// 设置配置值
    Set {
        /// 配置键 (如: server.bind, chat.history_limit)
        key: String,
        /// 配置值
        value: String,
    },
    /// 初始化默认配置
    Init {
        /// 强制覆盖已有配置
        #[arg(long, default_value = "false")]
        force: bool,
    },
    /// 显示当前配置
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = brick_config::expand_tilde(&cli.config)
        .unwrap_or_else(|| PathBuf::from(&cli.config));

    if cli.debug {
        eprintln!("{}", "[DEBUG] Debug mode enabled".dimmed());
        eprintln!("{}", format!("[DEBUG] Config path: {:?}", config_path).dimmed());
    }

    match cli.command {
        Commands::Chat { origin, user, lang } => {
            run_interactive_chat(&config_path, &origin, user, lang, cli.debug).await
        }
        Commands::History { user, path } => show_history(&config_path, user, path).await,
        Commands::Config(args) => handle_config(args, &config_path).await,
    }
}

async fn handle_config(args: ConfigArgs, config_path: &Path) -> anyhow::Result<()> {
    use brick_config::{Config, ConfigManager};

    match args.command {
        ConfigCommands::Get { key } => {
            let manager = ConfigManager::load(config_path).await?;
            let config = manager.snapshot().await;

            match config.get_value(&key) {
                Some(value) => {
                    println!("{}", format!("{} = {}", key, value).green());
                }
                None => {
                    println!("{}", format!("❌ Key not found: {}", key).red());
                    std::process::exit(1);
                }
            }
        }
        ConfigCommands::Set { key, value } => {
            let manager = ConfigManager::load(config_path).await?;
            if let Err(e) = manager
                .update(|config| config.set_value(&key, &value))
                .await
            {
                eprintln!("{}", format!("❌ Failed to set value: {}", e).red());
                std::process::exit(1);
            }
            println!("{}", format!("✅ Set {} = {}", key, value).green());
        }
        ConfigCommands::Init { force } => {
            if config_path.exists() && !force {
                println!("{}", format!("⚠️  Config already exists at {:?}", config_path).yellow());
                println!("{}", "Use --force to overwrite".dimmed());
                return Ok(());
            }

            brick_config::init_brick_dirs().await?;
            let manager = ConfigManager::new(Config::default(), config_path.to_path_buf());
            manager.save().await?;

            println!("{}", format!("✅ Config initialized at {:?}", config_path).green());
            println!("{}", "You can edit this file to customize your settings".dimmed());
        }
        ConfigCommands::Show => {
            let manager = ConfigManager::load(config_path).await?;
            let config = manager.snapshot().await;

            println!("{}", "📋 Current Configuration:".cyan().bold());
            println!();
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

async fn show_history(
    config_path: &Path,
    user: Option<String>,
    path: Option<String>,
) -> anyhow::Result<()> {
    let path = match path {
        Some(path) => path,
        None => {
            let manager = brick_config::ConfigManager::load(config_path).await?;
            let config = manager.snapshot().await;
            config
                .storage
                .path
                .ok_or_else(|| anyhow::anyhow!("storage.path is not configured"))?
        }
    };
    let path = brick_config::expand_tilde(&path).unwrap_or_else(|| PathBuf::from(&path));

    let log = JsonlStorage::open(&path).await?;
    let messages = log.list_by_user(user.as_deref()).await?;

    if messages.is_empty() {
        println!("{}", "No messages".dimmed());
        return Ok(());
    }
    for message in &messages {
        print_message(message, true);
    }
    println!();
    println!("{}", format!("{} message(s)", messages.len()).dimmed());
    Ok(())
}

async fn run_interactive_chat(
    config_path: &Path,
    origin: &str,
    user: Option<String>,
    language: Language,
    debug: bool,
) -> anyhow::Result<()> {
    let manager = brick_config::ConfigManager::load(config_path).await?;
    let client_config = manager.snapshot().await.client;

    let user_id = user.unwrap_or_else(|| format!("guest-{}", uuid::Uuid::new_v4()));
    let url = brick_client::channel_url(origin)?;
    let settings = ControllerSettings {
        reconnect_delay: Duration::from_millis(client_config.reconnect_delay_ms),
        typing_timeout: Duration::from_millis(client_config.typing_timeout_ms),
        fallback_delay: Duration::from_millis(client_config.fallback_delay_ms),
        ..ControllerSettings::new(url.clone(), user_id.clone())
    };
    let controller = ChannelController::new(settings, Arc::new(WsConnector::new()));

    println!("{}", "🤖 Brick Chat".cyan().bold());
    println!("{}", format!("Channel: {}", url).dimmed());
    println!("{}", format!("User: {}", user_id).dimmed());
    println!("{}", "Type /quit to exit".dimmed());
    println!("{}", "─".repeat(50).dimmed());

    let mut updates = controller.subscribe();
    let printer = tokio::spawn(async move {
        let mut last = ChatView::default();
        while updates.changed().await.is_ok() {
            let view = updates.borrow_and_update().clone();
            render_changes(&last, &view, debug);
            last = view;
        }
    });

    controller.open();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line == "/quit" || line == "/exit" {
            break;
        }
        if line.is_empty() {
            continue;
        }
        if let Err(e) = controller.send_chat(line, language) {
            println!("{}", format!("❌ {}", e).red());
        }
    }

    controller.close();
    printer.abort();
    println!("{}", "👋 Bye".dimmed());
    Ok(())
}

fn render_changes(last: &ChatView, view: &ChatView, debug: bool) {
    if view.connected != last.connected {
        if view.connected {
            println!("{}", "● connected".green());
        } else {
            println!("{}", "○ disconnected, replies are generated locally".yellow());
        }
    }

    let start = if view.messages.len() >= last.messages.len() {
        last.messages.len()
    } else {
        0
    };
    for message in &view.messages[start..] {
        print_message(message, debug);
    }

    if view.typing && !last.typing {
        println!("{}", "… assistant is typing".dimmed());
    }
}

fn print_message(message: &ChatMessage, with_meta: bool) {
    let time = message.created_at.format("%H:%M:%S");
    let label = match message.sender {
        Sender::User => "you".blue().bold(),
        Sender::Ai => "assistant".magenta().bold(),
    };
    if with_meta {
        let user = message.user_id.as_deref().unwrap_or("-");
        println!(
            "{} {} {}: {}",
            time.to_string().dimmed(),
            format!("[{}]", user).dimmed(),
            label,
            message.message
        );
    } else {
        println!("{} {}: {}", time.to_string().dimmed(), label, message.message);
    }
}
