//! System auto-proxy settings.
//!
//! [`NetworkSettings`] is the only way the engine touches the OS proxy
//! configuration. Two backends are provided:
//!
//! - [`NetworkSetupSettings`]: macOS `networksetup` for one network service
//! - [`GsettingsSettings`]: GNOME `gsettings` (`org.gnome.system.proxy`)
//!
//! All methods block on a child process; async callers run them on the
//! blocking pool.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use tracing::debug;

use super::error::SteeringError;

/// Snapshot of the auto-proxy configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoProxyState {
    /// Whether automatic proxy configuration is on.
    pub enabled: bool,
    /// Configured PAC URL, if any.
    pub url: Option<String>,
    /// Backend-specific proxy mode (GNOME: `none`, `manual` or `auto`).
    pub mode: Option<String>,
}

/// Read and change the system auto-proxy configuration.
pub trait NetworkSettings: Send + Sync {
    /// Human-readable backend name for logs.
    fn name(&self) -> String;

    /// Current configuration.
    fn snapshot(&self) -> Result<AutoProxyState, SteeringError>;

    /// Point auto-proxy at `url` and turn it on.
    fn apply_pac(&self, url: &str) -> Result<(), SteeringError>;

    /// Put back a configuration captured by [`snapshot`](Self::snapshot).
    fn restore(&self, state: &AutoProxyState) -> Result<(), SteeringError>;

    /// Turn auto-proxy off.
    fn disable(&self) -> Result<(), SteeringError>;
}

/// Settings backend for the current platform.
pub fn platform_settings(network_service: &str) -> Result<Arc<dyn NetworkSettings>, SteeringError> {
    if cfg!(target_os = "macos") {
        Ok(Arc::new(NetworkSetupSettings::new(network_service)?))
    } else {
        Ok(Arc::new(GsettingsSettings::new()?))
    }
}

/// Run a settings command and return its stdout.
fn run(binary: &Path, args: &[&str]) -> Result<String, SteeringError> {
    let cmd_str = format!("{} {}", binary.display(), args.join(" "));
    debug!("Running: {}", cmd_str);

    let output = Command::new(binary)
        .args(args)
        .output()
        .map_err(|e| SteeringError::CommandFailed {
            cmd: cmd_str.clone(),
            source: e,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(SteeringError::CommandError { cmd: cmd_str, stderr });
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn locate(tool: &str) -> Result<PathBuf, SteeringError> {
    which::which(tool).map_err(|_| SteeringError::ToolNotFound(tool.to_string()))
}

/// macOS backend for one network service.
#[derive(Debug, Clone)]
pub struct NetworkSetupSettings {
    binary: PathBuf,
    service: String,
}

impl NetworkSetupSettings {
    /// Locate `networksetup` and bind to a service such as `Wi-Fi`.
    pub fn new(service: &str) -> Result<Self, SteeringError> {
        Ok(Self {
            binary: locate("networksetup")?,
            service: service.to_string(),
        })
    }

    fn set_url(&self, url: &str) -> Result<(), SteeringError> {
        run(&self.binary, &["-setautoproxyurl", &self.service, url]).map(drop)
    }

    fn set_state(&self, on: bool) -> Result<(), SteeringError> {
        let state = if on { "on" } else { "off" };
        run(&self.binary, &["-setautoproxystate", &self.service, state]).map(drop)
    }
}

impl NetworkSettings for NetworkSetupSettings {
    fn name(&self) -> String {
        format!("networksetup ({})", self.service)
    }

    fn snapshot(&self) -> Result<AutoProxyState, SteeringError> {
        let output = run(&self.binary, &["-getautoproxyurl", &self.service])?;
        parse_autoproxy_output(&output).ok_or_else(|| SteeringError::UnexpectedOutput {
            cmd: format!("networksetup -getautoproxyurl {}", self.service),
            output: output.trim().to_string(),
        })
    }

    fn apply_pac(&self, url: &str) -> Result<(), SteeringError> {
        self.set_url(url)?;
        self.set_state(true)
    }

    fn restore(&self, state: &AutoProxyState) -> Result<(), SteeringError> {
        // networksetup cannot clear a URL; with no prior URL ours stays but is switched off
        if let Some(url) = &state.url {
            self.set_url(url)?;
        }
        self.set_state(state.enabled)
    }

    fn disable(&self) -> Result<(), SteeringError> {
        self.set_state(false)
    }
}

/// Parse `networksetup -getautoproxyurl` output.
///
/// ```text
/// URL: file:///tmp/focus-warden.pac
/// Enabled: Yes
/// ```
///
/// `URL: (null)` means no URL is configured.
pub fn parse_autoproxy_output(output: &str) -> Option<AutoProxyState> {
    let mut url = None;
    let mut enabled = None;

    for line in output.lines() {
        if let Some(value) = line.trim().strip_prefix("URL:") {
            let value = value.trim();
            url = Some(if value.is_empty() || value == "(null)" {
                None
            } else {
                Some(value.to_string())
            });
        } else if let Some(value) = line.trim().strip_prefix("Enabled:") {
            enabled = Some(value.trim().eq_ignore_ascii_case("yes"));
        }
    }

    Some(AutoProxyState {
        enabled: enabled?,
        url: url?,
        mode: None,
    })
}

/// GNOME backend.
#[derive(Debug, Clone)]
pub struct GsettingsSettings {
    binary: PathBuf,
}

const GNOME_PROXY_SCHEMA: &str = "org.gnome.system.proxy";

impl GsettingsSettings {
    /// Locate `gsettings`.
    pub fn new() -> Result<Self, SteeringError> {
        Ok(Self {
            binary: locate("gsettings")?,
        })
    }

    fn get(&self, key: &str) -> Result<String, SteeringError> {
        let raw = run(&self.binary, &["get", GNOME_PROXY_SCHEMA, key])?;
        Ok(unquote_gvariant(&raw))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SteeringError> {
        run(&self.binary, &["set", GNOME_PROXY_SCHEMA, key, value]).map(drop)
    }
}

impl NetworkSettings for GsettingsSettings {
    fn name(&self) -> String {
        "gsettings".to_string()
    }

    fn snapshot(&self) -> Result<AutoProxyState, SteeringError> {
        let mode = self.get("mode")?;
        let url = self.get("autoconfig-url")?;
        Ok(AutoProxyState {
            enabled: mode == "auto",
            url: if url.is_empty() { None } else { Some(url) },
            mode: Some(mode),
        })
    }

    fn apply_pac(&self, url: &str) -> Result<(), SteeringError> {
        self.set("autoconfig-url", url)?;
        self.set("mode", "auto")
    }

    fn restore(&self, state: &AutoProxyState) -> Result<(), SteeringError> {
        self.set("autoconfig-url", state.url.as_deref().unwrap_or(""))?;
        let mode = match (&state.mode, state.enabled) {
            (Some(mode), _) => mode.as_str(),
            (None, true) => "auto",
            (None, false) => "none",
        };
        self.set("mode", mode)
    }

    fn disable(&self) -> Result<(), SteeringError> {
        self.set("mode", "none")
    }
}

/// Strip GVariant string quoting: `'auto'` -> `auto`.
fn unquote_gvariant(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .unwrap_or(trimmed)
        .to_string()
}
