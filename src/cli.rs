//! Command-line interface definitions for focus-warden.
//!
//! Uses clap's derive API for type-safe argument parsing.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use crate::browser::TabAction;

/// Focus mode enforcement.
///
/// focus-warden closes distracting applications and blocks distracting
/// websites for the length of a focus session, then puts everything back.
#[derive(Parser, Debug)]
#[command(name = "focus-warden")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// What to do.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to additional config file.
    ///
    /// This config file is merged on top of system and user configs,
    /// giving it the highest priority (except for CLI flags).
    #[arg(short = 'c', long = "config", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity.
    ///
    /// Can be specified multiple times:
    /// -v    = info level
    /// -vv   = debug level
    /// -vvv  = trace level
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

/// Subcommands for focus-warden.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a focus session and enforce it until it ends.
    Start {
        /// Mode to enforce (a `[modes.<name>]` key).
        mode: String,

        /// End the session automatically, e.g. `25m`, `1h`, `90s`.
        #[arg(short = 'd', long = "duration", value_parser = parse_duration)]
        duration: Option<Duration>,

        /// Proxy listen port (overrides `proxy.port`).
        #[arg(short = 'p', long = "port")]
        port: Option<u16>,

        /// What to do with a blocked browser tab (overrides `browser.action`).
        #[arg(long = "action", value_enum)]
        action: Option<TabActionArg>,
    },

    /// List configured focus modes.
    Modes,

    /// Print the PAC script a mode would install.
    Pac {
        /// Mode name.
        mode: String,
    },

    /// Show whether a mode blocks a host or URL.
    Check {
        /// Mode name.
        mode: String,

        /// Host name or URL to test.
        target: String,
    },
}

/// Command-line spelling of [`TabAction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TabActionArg {
    /// Navigate the tab to a blank page.
    Blank,
    /// Close the tab.
    Close,
}

impl From<TabActionArg> for TabAction {
    fn from(arg: TabActionArg) -> Self {
        match arg {
            TabActionArg::Blank => TabAction::NavigateBlank,
            TabActionArg::Close => TabAction::CloseTab,
        }
    }
}

/// Parse a session length: `90s`, `25m`, `1h` or bare seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let (digits, unit) = match raw.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => raw.split_at(idx),
        None => (raw, "s"),
    };

    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration '{}'", raw))?;
    let secs = match unit {
        "s" => Some(value),
        "m" => value.checked_mul(60),
        "h" => value.checked_mul(3600),
        _ => return Err(format!("unknown duration unit in '{}' (use s, m or h)", raw)),
    }
    .ok_or_else(|| format!("duration '{}' is too long", raw))?;

    if secs == 0 {
        return Err("duration must be greater than zero".to_string());
    }
    Ok(Duration::from_secs(secs))
}
