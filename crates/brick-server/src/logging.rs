//! Structured logging setup

use std::path::Path;

use anyhow::{Context, Result};
use brick_config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Build the filter: `RUST_LOG` wins, then `level_override`, then the
/// config level plus its per-module directives.
pub fn build_filter(config: &LoggingConfig, level_override: Option<&str>) -> Result<EnvFilter> {
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        return EnvFilter::try_from_default_env().context("Invalid RUST_LOG");
    }

    let level = level_override.unwrap_or(config.level.as_str());
    let mut filter = EnvFilter::try_new(level).context("Invalid log level")?;
    for (module, module_level) in &config.module_levels {
        let directive = format!("{}={}", module, module_level)
            .parse()
            .with_context(|| format!("Invalid directive for module '{}'", module))?;
        filter = filter.add_directive(directive);
    }
    Ok(filter)
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer and must be held for the
/// life of the process.
pub fn init_logging(
    config: &LoggingConfig,
    level_override: Option<&str>,
) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(config, level_override)?;

    let mut layers = Vec::new();
    layers.push(if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    });

    let mut guard = None;
    if let Some(file) = &config.file {
        let path = brick_config::expand_tilde(file).unwrap_or_else(|| file.into());
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .context("logging.file must name a file")?;
        let appender = tracing_appender::rolling::daily(dir, name);
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        layers.push(
            tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
        );
        guard = Some(file_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
