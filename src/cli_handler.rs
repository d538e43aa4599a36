//! Subcommand handling for focus-warden.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::blocklist::{BlockList, url_host};
use crate::cli::{Cli, Commands};
use crate::config::{Config, ConfigError, ConfigLoader, FocusMode};
use crate::orchestrator::{EngineDeps, FocusSession, run_session};
use crate::steering::PacDocument;
use crate::telemetry::AuditLogger;

/// Run the subcommand selected on the command line.
pub fn handle_command(cli: Cli, loader: &ConfigLoader, mut config: Config) -> Result<()> {
    match cli.command {
        Commands::Start {
            mode,
            duration,
            port,
            action,
        } => {
            if let Some(port) = port {
                config.proxy.port = Some(port);
            }
            if let Some(action) = action {
                config.browser.action = Some(action.into());
            }
            let mode = resolve_mode(&config, &mode)?;
            run_start(config, mode, duration)
        }
        Commands::Modes => {
            list_modes(&config, loader);
            Ok(())
        }
        Commands::Pac { mode } => {
            let mode = resolve_mode(&config, &mode)?;
            let blocklist = BlockList::from_mode(&mode);
            let pac = PacDocument::generate(blocklist.domains(), config.proxy.port());
            print!("{}", pac.script());
            Ok(())
        }
        Commands::Check { mode, target } => {
            let mode = resolve_mode(&config, &mode)?;
            check_target(&mode, &target);
            Ok(())
        }
    }
}

fn resolve_mode(config: &Config, key: &str) -> Result<FocusMode, ConfigError> {
    config
        .mode(key)
        .ok_or_else(|| ConfigError::UnknownMode(key.to_string()))
}

fn run_start(config: Config, mode: FocusMode, duration: Option<std::time::Duration>) -> Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    rt.block_on(async {
        let audit = Arc::new(AuditLogger::connect_or_null());
        let deps = EngineDeps::platform(&config, audit);
        let session = FocusSession::new(config, deps);
        run_session(&session, mode, duration).await
    })
}

fn list_modes(config: &Config, loader: &ConfigLoader) {
    if config.modes.is_empty() {
        println!("No focus modes configured.");
        println!("Add a [modes.<name>] section to {}", loader.user_path().display());
        return;
    }

    for key in config.mode_names() {
        let Some(mode) = config.mode(key) else {
            continue;
        };
        println!(
            "{:<16} {:<20} {} app(s), {} site(s)",
            key,
            mode.name,
            mode.blocked_apps.len(),
            mode.blocked_sites.len()
        );
    }
}

fn check_target(mode: &FocusMode, target: &str) {
    let blocklist = BlockList::from_mode(mode);
    let host = url_host(target).unwrap_or_else(|| target.trim().to_ascii_lowercase());

    if blocklist.is_host_blocked(&host) {
        println!("{}: blocked by '{}'", host, mode.name);
    } else {
        println!("{}: allowed by '{}'", host, mode.name);
    }
}
