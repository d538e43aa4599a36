//! focus-warden: focus mode enforcement
//!
//! This is the main entry point for the focus-warden binary. It handles CLI
//! argument parsing, configuration loading and logging setup, then hands the
//! selected subcommand to the handler.
//!
//! # Logging
//!
//! - **Audit logging**: enforcement events go to syslog as JSON, never to the
//!   terminal
//! - **Debug logging**: `tracing` output goes to stderr, filtered by `-v`,
//!   `RUST_LOG` or `general.log_level`

use anyhow::{Context, Result};
use clap::Parser;
use focus_warden::{cli::Cli, cli_handler::handle_command, config::ConfigLoader};
use tracing::debug;

fn main() -> Result<()> {
    // Parse CLI arguments first (before any other initialization)
    let cli = Cli::parse();

    // Load configuration with hierarchy merging
    let config_loader = ConfigLoader::new();
    let config = config_loader
        .load(cli.config.as_deref())
        .context("Failed to load configuration")?;

    init_tracing(cli.verbose, &config.general.log_level)?;
    debug!("Parsed CLI arguments: {:?}", cli);
    debug!("Loaded configuration: {:?}", config);

    handle_command(cli, &config_loader, config)
}

/// Initialize the tracing subscriber for debug/development logging.
///
/// This is separate from the audit telemetry which goes to syslog.
///
/// # Verbosity Levels
/// - 0 (default): `RUST_LOG`, else `general.log_level`, else warnings and errors
/// - 1 (-v): Info level
/// - 2 (-vv): Debug level
/// - 3+ (-vvv): Trace level
fn init_tracing(verbose: u8, config_level: &str) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let fallback = if config_level.is_empty() { "warn" } else { config_level };
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(())
}
