//! wsgate
//!
//! Sandboxed workspace file gateway.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use gateway::config::{default_config_path, generate_token, Config};
use gateway::{logging, GatewayServer};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// wsgate - sandboxed per-agent workspace file gateway.
#[derive(Parser, Debug)]
#[command(name = "wsgate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Serve the workspace API until SIGINT or SIGTERM
    Serve {
        /// Listen address, overriding the configuration
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },

    /// Inspect or create the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Subcommands for configuration management.
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Print the effective configuration (token redacted)
    Show,

    /// Write a default configuration with a fresh access token
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);

    match cli.command {
        Commands::Serve { bind } => serve(&config_path, bind, cli.verbose).await,
        Commands::Config(ConfigCommands::Show) => show_config(&config_path),
        Commands::Config(ConfigCommands::Init { force }) => init_config(&config_path, force),
    }
}

/// Load configuration, then serve until a shutdown signal arrives.
async fn serve(config_path: &Path, bind: Option<String>, verbose: bool) -> anyhow::Result<()> {
    let mut config = Config::load(config_path)?;
    config.apply_env_overrides();
    if let Some(bind) = bind {
        config.server.bind_addr = bind;
    }
    config.validate()?;

    let _log_guard = logging::init(&config.server, verbose)?;

    tracing::info!(
        config = %config_path.display(),
        base_dir = %config.workspace.base_dir.display(),
        "wsgate starting"
    );

    let server = GatewayServer::bind(&config).await?;
    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone())?;

    server.run(shutdown).await
}

/// Cancel `shutdown` on the first SIGTERM or SIGINT.
fn spawn_signal_handler(shutdown: CancellationToken) -> anyhow::Result<()> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT");
            }
        }
        shutdown.cancel();
    });

    Ok(())
}

fn show_config(config_path: &Path) -> anyhow::Result<()> {
    let mut config = Config::load(config_path)?;
    config.apply_env_overrides();

    println!("# {}", config_path.display());
    print!("{}", config.redacted().to_toml()?);
    Ok(())
}

fn init_config(config_path: &Path, force: bool) -> anyhow::Result<()> {
    if config_path.exists() && !force {
        bail!(
            "Config file already exists at {} (use --force to overwrite)",
            config_path.display()
        );
    }

    let mut config = Config::default();
    config.auth.token = generate_token();
    config.save(config_path)?;

    println!("Wrote configuration to {}", config_path.display());
    println!("Access token: {}", config.auth.token);
    Ok(())
}
