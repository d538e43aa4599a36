//! Configuration system for focus-warden.
//!
//! This module provides TOML configuration loading with hierarchy merging.
//! Focus modes are defined in `[modes.<name>]` sections of the config file.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded from multiple sources and merged in order:
//!
//! 1. Embedded defaults
//! 2. System config: `/etc/focus-warden/config.toml`
//! 3. User config: `~/.config/focus-warden/config.toml`
//! 4. Additional config file (via `--config` flag)
//!
//! # Merge Behavior
//!
//! - **Lists** (blocked apps, allowlist) are **merged** (appended)
//! - **Scalars** (port, intervals) are **overridden** when set
//! - **Modes** are merged by key
//!
//! # Mode Configuration
//!
//! ```toml
//! [modes.deep-work]
//! name = "Deep Work"
//! blocked_apps = ["Slack", "Discord"]
//! blocked_sites = ["youtube.com", "reddit.com"]
//! ```

mod error;
mod loader;
mod schema;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{
    AppsConfig, BrowserConfig, Config, FocusMode, GeneralConfig, ModeConfig, NotifyConfig,
    ProxySettings, SteeringConfig, DEFAULT_HEADER_LIMIT, DEFAULT_PROXY_PORT,
    DEFAULT_REQUEST_LINE_LIMIT,
};
