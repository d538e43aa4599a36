//! Configuration schema definitions.
//!
//! This module defines the structure of the focus-warden configuration files.
//! Configuration is loaded from multiple sources and merged in order:
//!
//! 1. Embedded defaults
//! 2. System config: `/etc/focus-warden/config.toml`
//! 3. User config: `~/.config/focus-warden/config.toml`
//! 4. Additional config file (via `--config` flag)
//!
//! Scalar settings are optional in the file format. Unset scalars fall back to
//! the defaults exposed by the accessor methods, so a later file only needs to
//! name the values it changes.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use crate::browser::TabAction;

/// Default proxy listen port on 127.0.0.1.
pub const DEFAULT_PROXY_PORT: u16 = 8899;

/// Default bound on the request line, in bytes.
pub const DEFAULT_REQUEST_LINE_LIMIT: usize = 2048;

/// Default bound on the request header block, in bytes.
pub const DEFAULT_HEADER_LIMIT: usize = 8192;

/// Default network service whose auto-proxy settings are steered (macOS).
pub const DEFAULT_NETWORK_SERVICE: &str = "Wi-Fi";

/// Top-level configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Intercepting proxy settings.
    #[serde(default)]
    pub proxy: ProxySettings,

    /// Application sweep settings.
    #[serde(default)]
    pub apps: AppsConfig,

    /// Browser tab watcher settings.
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Reminder notification settings.
    #[serde(default)]
    pub notify: NotifyConfig,

    /// PAC traffic steering settings.
    #[serde(default)]
    pub steering: SteeringConfig,

    /// Named focus modes, keyed by the name used on the command line.
    #[serde(default)]
    pub modes: BTreeMap<String, ModeConfig>,
}

impl Config {
    /// Merge another config into this one.
    ///
    /// Lists are merged (appended). Scalars are overridden when set.
    /// Modes are merged by key.
    pub fn merge(&mut self, other: Config) {
        self.general.merge(other.general);
        self.proxy.merge(other.proxy);
        self.apps.merge(other.apps);
        self.browser.merge(other.browser);
        self.notify.merge(other.notify);
        self.steering.merge(other.steering);

        for (key, other_mode) in other.modes {
            if let Some(existing) = self.modes.get_mut(&key) {
                existing.merge(other_mode);
            } else {
                self.modes.insert(key, other_mode);
            }
        }
    }

    /// Names of the configured modes.
    pub fn mode_names(&self) -> Vec<&str> {
        self.modes.keys().map(String::as_str).collect()
    }

    /// Resolve a configured mode by key.
    pub fn mode(&self, key: &str) -> Option<FocusMode> {
        self.modes.get(key).map(|m| m.to_focus_mode(key))
    }
}

/// General application settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub log_level: String,
}

impl GeneralConfig {
    fn merge(&mut self, other: GeneralConfig) {
        if !other.log_level.is_empty() {
            self.log_level = other.log_level;
        }
    }
}

/// Intercepting proxy settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ProxySettings {
    /// Port to listen on (127.0.0.1).
    #[serde(default)]
    pub port: Option<u16>,

    /// Maximum bytes read while waiting for the request line.
    #[serde(default)]
    pub request_line_limit: Option<usize>,

    /// Maximum bytes read while waiting for the end of the header block.
    #[serde(default)]
    pub header_limit: Option<usize>,

    /// Per-connection bound on waiting for client bytes, in milliseconds.
    #[serde(default)]
    pub read_timeout_ms: Option<u64>,

    /// Relay traffic for hosts that are not blocked instead of closing.
    #[serde(default)]
    pub forward_unblocked: Option<bool>,
}

impl ProxySettings {
    fn merge(&mut self, other: ProxySettings) {
        self.port = other.port.or(self.port);
        self.request_line_limit = other.request_line_limit.or(self.request_line_limit);
        self.header_limit = other.header_limit.or(self.header_limit);
        self.read_timeout_ms = other.read_timeout_ms.or(self.read_timeout_ms);
        self.forward_unblocked = other.forward_unblocked.or(self.forward_unblocked);
    }

    /// Listen port.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PROXY_PORT)
    }

    /// Request line bound; never below 2 KiB.
    pub fn request_line_limit(&self) -> usize {
        self.request_line_limit
            .unwrap_or(DEFAULT_REQUEST_LINE_LIMIT)
            .max(DEFAULT_REQUEST_LINE_LIMIT)
    }

    /// Header block bound; never below 8 KiB.
    pub fn header_limit(&self) -> usize {
        self.header_limit
            .unwrap_or(DEFAULT_HEADER_LIMIT)
            .max(DEFAULT_HEADER_LIMIT)
    }

    /// Per-connection read timeout.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.unwrap_or(5000))
    }

    /// Whether unblocked traffic is relayed upstream.
    pub fn forward_unblocked(&self) -> bool {
        self.forward_unblocked.unwrap_or(false)
    }
}

/// Application sweep settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AppsConfig {
    /// Interval between full sweeps, in milliseconds (clamped to 400..=1000).
    #[serde(default)]
    pub sweep_interval_ms: Option<u64>,

    /// Grace window between graceful and forced termination, in milliseconds.
    #[serde(default)]
    pub grace_ms: Option<u64>,

    /// Extra identifiers that are never terminated.
    #[serde(default)]
    pub allowlist: Vec<String>,
}

impl AppsConfig {
    fn merge(&mut self, other: AppsConfig) {
        self.sweep_interval_ms = other.sweep_interval_ms.or(self.sweep_interval_ms);
        self.grace_ms = other.grace_ms.or(self.grace_ms);
        self.allowlist.extend(other.allowlist);
    }

    /// Sweep interval.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.unwrap_or(700).clamp(400, 1000))
    }

    /// Grace window before forced termination.
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms.unwrap_or(250))
    }
}

/// Browser tab watcher settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct BrowserConfig {
    /// Whether the tab watcher runs at all.
    #[serde(default)]
    pub enabled: Option<bool>,

    /// Poll interval, in milliseconds (clamped to 300..=500).
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,

    /// What to do with a blocked tab.
    #[serde(default)]
    pub action: Option<TabAction>,

    /// Bound on a single scripting bridge call, in milliseconds.
    #[serde(default)]
    pub script_timeout_ms: Option<u64>,
}

impl BrowserConfig {
    fn merge(&mut self, other: BrowserConfig) {
        self.enabled = other.enabled.or(self.enabled);
        self.poll_interval_ms = other.poll_interval_ms.or(self.poll_interval_ms);
        self.action = other.action.or(self.action);
        self.script_timeout_ms = other.script_timeout_ms.or(self.script_timeout_ms);
    }

    /// Whether the watcher is enabled.
    pub fn enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// Poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.unwrap_or(400).clamp(300, 500))
    }

    /// Action for blocked tabs.
    pub fn action(&self) -> TabAction {
        self.action.unwrap_or_default()
    }

    /// Scripting bridge call timeout.
    pub fn script_timeout(&self) -> Duration {
        Duration::from_millis(self.script_timeout_ms.unwrap_or(1500))
    }
}

/// Reminder notification settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NotifyConfig {
    /// Whether desktop notifications are shown.
    #[serde(default)]
    pub enabled: Option<bool>,

    /// Minimum seconds between two reminders.
    #[serde(default)]
    pub cooldown_secs: Option<u64>,
}

impl NotifyConfig {
    fn merge(&mut self, other: NotifyConfig) {
        self.enabled = other.enabled.or(self.enabled);
        self.cooldown_secs = other.cooldown_secs.or(self.cooldown_secs);
    }

    /// Whether notifications are enabled.
    pub fn enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// Reminder cool-down window.
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs.unwrap_or(10))
    }
}

/// PAC traffic steering settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SteeringConfig {
    /// Whether system auto-proxy settings are modified.
    #[serde(default)]
    pub enabled: Option<bool>,

    /// Network service to configure (macOS `networksetup` service name).
    #[serde(default)]
    pub network_service: String,

    /// Where the PAC file is written. Empty means the temp directory.
    #[serde(default)]
    pub pac_path: Option<PathBuf>,
}

impl SteeringConfig {
    fn merge(&mut self, other: SteeringConfig) {
        self.enabled = other.enabled.or(self.enabled);
        if !other.network_service.is_empty() {
            self.network_service = other.network_service;
        }
        self.pac_path = other.pac_path.or(self.pac_path.take());
    }

    /// Whether steering is enabled.
    pub fn enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// Network service name.
    pub fn network_service(&self) -> &str {
        if self.network_service.is_empty() {
            DEFAULT_NETWORK_SERVICE
        } else {
            &self.network_service
        }
    }

    /// PAC file location.
    pub fn pac_path(&self) -> PathBuf {
        match &self.pac_path {
            Some(path) if !path.as_os_str().is_empty() => path.clone(),
            _ => std::env::temp_dir().join("focus-warden.pac"),
        }
    }
}

/// A named focus mode as written in the config file.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ModeConfig {
    /// Stable identifier. Generated when absent.
    #[serde(default)]
    pub id: Option<Uuid>,

    /// Display name. Defaults to the mode key.
    #[serde(default)]
    pub name: Option<String>,

    /// Application identifiers to terminate.
    #[serde(default)]
    pub blocked_apps: Vec<String>,

    /// Domains to block (normalized when the session starts).
    #[serde(default)]
    pub blocked_sites: Vec<String>,
}

impl ModeConfig {
    /// Merge another definition of the same mode into this one.
    ///
    /// - `id`, `name`: later wins if set
    /// - `blocked_apps`, `blocked_sites`: appended
    pub fn merge(&mut self, other: ModeConfig) {
        self.id = other.id.or(self.id);
        if other.name.is_some() {
            self.name = other.name;
        }
        self.blocked_apps.extend(other.blocked_apps);
        self.blocked_sites.extend(other.blocked_sites);
    }

    /// Convert into the record handed to the engine.
    pub fn to_focus_mode(&self, key: &str) -> FocusMode {
        FocusMode {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            name: self.name.clone().unwrap_or_else(|| key.to_string()),
            blocked_apps: self.blocked_apps.iter().cloned().collect(),
            blocked_sites: self.blocked_sites.iter().cloned().collect(),
        }
    }
}

/// A focus mode record as consumed by the engine.
///
/// The engine receives this by value at session start and never writes back.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FocusMode {
    /// Stable identifier.
    pub id: Uuid,
    /// Display name, used in reminders.
    pub name: String,
    /// Application identifiers to terminate.
    pub blocked_apps: BTreeSet<String>,
    /// Domains to block.
    pub blocked_sites: BTreeSet<String>,
}

impl FocusMode {
    /// Create a mode with a fresh identifier.
    pub fn new<A, S>(name: &str, blocked_apps: A, blocked_sites: S) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        S: IntoIterator,
        S::Item: Into<String>,
    {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            blocked_apps: blocked_apps.into_iter().map(Into::into).collect(),
            blocked_sites: blocked_sites.into_iter().map(Into::into).collect(),
        }
    }
}
