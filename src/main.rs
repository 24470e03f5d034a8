//! # AI Proxy Gateway
//!
//! OpenAI-compatible proxy that routes chat completions across AI providers
//! with ordered fallback and credential rotation.
//!
//! ## Usage
//!
//! ```bash
//! # Start with a config file
//! ai-proxy-gateway --config /path/to/gateway.yaml
//!
//! # Validate configuration and exit
//! ai-proxy-gateway --config gateway.yaml --check
//!
//! # Environment overrides
//! GATEWAY_PORT=9000 GATEWAY_ROUTES='[...]' ai-proxy-gateway
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use gateway_config::{ConfigLoader, GatewayConfig};
use gateway_server::Server;
use gateway_telemetry::{init_logging, LoggingConfig};
use std::path::PathBuf;
use tracing::{error, info};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "ai-proxy-gateway")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path (YAML, TOML or JSON)
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level or filter directive (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Validate configuration and exit
    #[arg(long)]
    check: bool,
}

/// Application entry point
#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            if let Err(log_err) = init_logging(&LoggingConfig::default()) {
                eprintln!("Failed to initialize logging: {log_err}");
            }
            error!(error = %format!("{e:#}"), "Configuration failed");
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting AI proxy gateway"
    );
    info!(
        file = ?cli.config,
        routes = config.routes.len(),
        auth = config.auth.enabled(),
        rotation = ?config.rotation,
        "Configuration loaded"
    );

    if cli.check {
        info!(routes = config.routes.len(), "Configuration is valid");
        return;
    }

    if let Err(e) = run(&config).await {
        error!(error = %format!("{e:#}"), "Gateway failed");
        std::process::exit(1);
    }
}

/// Load configuration and apply command-line overrides
fn load_config(cli: &Cli) -> Result<GatewayConfig> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_file(path);
    }

    let mut config = loader
        .load_unchecked()
        .context("Failed to load configuration")?;

    if let Some(host) = &cli.host {
        config.server.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(level) = &cli.log_level {
        config.logging.level.clone_from(level);
    }

    config.check().context("Invalid configuration")?;
    Ok(config)
}

/// Assemble the gateway and serve until shutdown
async fn run(config: &GatewayConfig) -> Result<()> {
    let server = Server::from_config(config).context("Failed to build gateway")?;
    server.run().await.context("Server error")?;
    Ok(())
}
