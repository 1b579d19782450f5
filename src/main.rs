//! socksd - SOCKS4/4a and SOCKS5 proxy server

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use socksd::config::{AuthMethodConfig, Config, ConfigManager};
use socksd::{ConnectionManager, ShutdownCoordinator};

/// CLI arguments for socksd
#[derive(Parser, Debug)]
#[command(name = "socksd")]
#[command(about = "SOCKS4/4a and SOCKS5 proxy server")]
#[command(version)]
#[command(long_about = "
socksd - SOCKS4/4a and SOCKS5 proxy server

Configuration priority (highest to lowest):
1. Command-line arguments
2. Configuration file
3. Environment variables, read only when the configuration file does not exist
4. Built-in defaults

Environment variables:
  SOCKSD_SOCKS4_BIND_ADDR   - SOCKS4 listen address, or 'off'
  SOCKSD_SOCKS5_BIND_ADDR   - SOCKS5 listen address, or 'off'
  SOCKSD_HANDSHAKE_TIMEOUT  - Handshake deadline (e.g., 10s); unset waits forever
  SOCKSD_CONNECT_TIMEOUT    - Destination connect deadline (e.g., 5s)
  SOCKSD_BUFFER_SIZE        - Relay buffer size in bytes
  SOCKSD_AUTH_METHODS       - Comma-separated SOCKS5 methods (none, username_password)
  SOCKSD_LOG_LEVEL          - Log level (trace, debug, info, warn, error)
")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "socksd.toml", help = "Path to configuration file")]
    pub config: PathBuf,

    #[arg(long, help = "SOCKS4 listen address (e.g., 127.0.0.1:1080)")]
    pub socks4: Option<SocketAddr>,

    #[arg(long, help = "SOCKS5 listen address (e.g., 127.0.0.1:1081)")]
    pub socks5: Option<SocketAddr>,

    #[arg(long, help = "Do not start the SOCKS4 listener")]
    pub disable_socks4: bool,

    #[arg(long, help = "Do not start the SOCKS5 listener")]
    pub disable_socks5: bool,

    /// Disable authentication (overrides config file)
    #[arg(long, help = "Offer only the no-authentication method")]
    pub no_auth: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, help = "Log level")]
    pub log_level: Option<String>,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Configuration priority: CLI args > config file > environment > defaults
    let mut config = if args.config.exists() {
        ConfigManager::load_from_file(&args.config)?
    } else {
        ConfigManager::load_from_env()?
    };

    init_tracing(&args, &config)?;
    info!("Starting socksd v{}", env!("CARGO_PKG_VERSION"));

    config.merge_with_cli_args(
        args.socks4,
        args.socks5,
        args.disable_socks4,
        args.disable_socks5,
        args.no_auth,
        args.log_level.as_deref(),
    );

    config
        .validate()
        .context("Final configuration validation failed")?;

    if args.validate_config {
        info!("Configuration is valid");
        log_summary(&config);
        return Ok(());
    }

    log_summary(&config);

    let shutdown_coordinator = ShutdownCoordinator::new(config.server.shutdown_timeout);
    let mut connection_manager = ConnectionManager::new(Arc::new(config))
        .context("Failed to build authentication methods")?;

    connection_manager
        .start()
        .await
        .context("Failed to start listeners")?;

    info!("socksd started; press Ctrl+C or send SIGTERM/SIGINT to shut down");

    if let Err(e) = shutdown_coordinator.listen_for_signals().await {
        error!("Error setting up signal handlers: {}", e);
    }

    shutdown_coordinator.shutdown(&mut connection_manager).await?;
    info!("Server shutdown complete");

    Ok(())
}

fn log_summary(config: &Config) {
    let describe = |addr: Option<SocketAddr>| {
        addr.map_or_else(|| "disabled".to_string(), |a| a.to_string())
    };
    info!("  SOCKS4 listener: {}", describe(config.server.socks4_bind_addr));
    info!("  SOCKS5 listener: {}", describe(config.server.socks5_bind_addr));
    info!(
        "  SOCKS5 methods: {}",
        config
            .auth
            .methods
            .iter()
            .map(|m| match m {
                AuthMethodConfig::None => "none",
                AuthMethodConfig::UsernamePassword => "username_password",
            })
            .collect::<Vec<_>>()
            .join(", ")
    );
    info!("  Handshake timeout: {:?}", config.server.handshake_timeout);
    info!("  Connect timeout: {:?}", config.server.connect_timeout);
    info!("  Buffer size: {} bytes", config.server.buffer_size);
}

/// Initialize tracing/logging
fn init_tracing(args: &CliArgs, config: &Config) -> Result<()> {
    let log_level = if args.verbose {
        "debug"
    } else {
        args.log_level.as_deref().unwrap_or(&config.logging.level)
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true),
        )
        .with(env_filter)
        .init();

    Ok(())
}
