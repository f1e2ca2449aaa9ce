//! zkbd: zerok-billing proof server
//!
//! Usage:
//!   zkbd [--config /etc/zkb/config.toml] [--log info] [--log-format text|json]
//!
//! Serves the `/api` proof surface on `server.listen` and, when
//! `server.metrics_addr` is set, Prometheus metrics and health endpoints beside it.

mod daemon;
mod metrics;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{info, warn};
use zkb_core::config::ZkbConfig;

#[derive(Parser, Debug)]
#[command(name = "zkbd", version, about = "zerok-billing proof server")]
struct Cli {
    /// Path to the zkb configuration file
    #[arg(
        long,
        short = 'c',
        env = "ZKB_CONFIG",
        default_value = "/etc/zkb/config.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides server.log_level
    #[arg(long, env = "ZKB_LOG")]
    log: Option<String>,

    /// Log format; overrides server.log_format
    #[arg(long, env = "ZKB_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging settings may come from the file, so it is read first
    let config = ZkbConfig::load(&cli.config)
        .map_err(|e| anyhow::anyhow!("loading config {}: {e}", cli.config.display()))?;

    let level = cli.log.as_deref().unwrap_or(&config.server.log_level);
    let format = cli.log_format.clone().unwrap_or_else(|| {
        LogFormat::from_str(&config.server.log_format, true).unwrap_or(LogFormat::Text)
    });
    init_logging(level, &format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "zkbd starting"
    );
    if !cli.config.exists() {
        warn!(path = %cli.config.display(), "config file not found (using defaults)");
    }

    daemon::run(config).await
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}
