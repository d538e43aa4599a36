//! Scripting bridge to browsers.
//!
//! Browsers are grouped into families that share a scripting dictionary. A
//! [`BrowserRegistry`] maps bundle identifiers to their family, and the
//! family renders the script for each operation.
//!
//! # Example
//!
//! ```ignore
//! use focus_warden::browser::{AppleScriptBridge, BrowserAutomationBridge, BrowserRegistry};
//! use std::time::Duration;
//!
//! let registry = BrowserRegistry::default();
//! let bridge = AppleScriptBridge::new(Duration::from_millis(1500));
//!
//! if let Some(target) = registry.lookup("com.apple.Safari") {
//!     let url = bridge.active_tab_url(target).await?;
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::trace;

use super::error::BridgeError;

/// Scripting dictionary shared by a group of browsers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserFamily {
    /// Safari and Safari Technology Preview.
    SafariLike,
    /// Chrome, Brave, Edge, Arc and other Chromium derivatives.
    ChromiumLike,
}

impl BrowserFamily {
    /// Object specifier for the tab the user is looking at.
    fn tab_specifier(self) -> &'static str {
        match self {
            BrowserFamily::SafariLike => "current tab of front window",
            BrowserFamily::ChromiumLike => "active tab of front window",
        }
    }

    /// Script returning the active tab URL, or an empty string without windows.
    pub fn get_url_script(self, bundle_id: &str) -> String {
        format!(
            r#"tell application id "{bid}"
  if (count of windows) = 0 then return ""
  return URL of {tab}
end tell"#,
            bid = escape_applescript(bundle_id),
            tab = self.tab_specifier(),
        )
    }

    /// Script pointing the active tab at `url`.
    pub fn set_url_script(self, bundle_id: &str, url: &str) -> String {
        format!(
            r#"tell application id "{bid}"
  if (count of windows) = 0 then return false
  set URL of {tab} to "{url}"
  return true
end tell"#,
            bid = escape_applescript(bundle_id),
            tab = self.tab_specifier(),
            url = escape_applescript(url),
        )
    }

    /// Script closing the active tab.
    pub fn close_tab_script(self, bundle_id: &str) -> String {
        format!(
            r#"tell application id "{bid}"
  if (count of windows) = 0 then return false
  close {tab}
  return true
end tell"#,
            bid = escape_applescript(bundle_id),
            tab = self.tab_specifier(),
        )
    }
}

/// A scriptable browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserTarget {
    /// Bundle identifier, e.g. `com.apple.Safari`.
    pub bundle_id: String,
    /// Display name for logs.
    pub name: String,
    /// Scripting family.
    pub family: BrowserFamily,
}

impl BrowserTarget {
    /// Create a target.
    pub fn new(bundle_id: &str, name: &str, family: BrowserFamily) -> Self {
        Self {
            bundle_id: bundle_id.to_string(),
            name: name.to_string(),
            family,
        }
    }
}

/// Known browsers keyed by bundle identifier.
#[derive(Debug, Clone)]
pub struct BrowserRegistry {
    targets: Vec<BrowserTarget>,
}

impl Default for BrowserRegistry {
    fn default() -> Self {
        use BrowserFamily::{ChromiumLike, SafariLike};

        let targets = [
            ("com.apple.Safari", "Safari", SafariLike),
            ("com.apple.SafariTechnologyPreview", "Safari Technology Preview", SafariLike),
            ("com.google.Chrome", "Google Chrome", ChromiumLike),
            ("com.google.Chrome.beta", "Google Chrome Beta", ChromiumLike),
            ("com.google.Chrome.canary", "Google Chrome Canary", ChromiumLike),
            ("com.brave.Browser", "Brave", ChromiumLike),
            ("com.brave.Browser.beta", "Brave Beta", ChromiumLike),
            ("com.microsoft.edgemac", "Microsoft Edge", ChromiumLike),
            ("company.thebrowser.Browser", "Arc", ChromiumLike),
        ]
        .into_iter()
        .map(|(bid, name, family)| BrowserTarget::new(bid, name, family))
        .collect();

        Self { targets }
    }
}

impl BrowserRegistry {
    /// A registry with no browsers.
    pub fn empty() -> Self {
        Self { targets: Vec::new() }
    }

    /// Add or replace a browser.
    pub fn register(&mut self, target: BrowserTarget) {
        self.targets
            .retain(|t| !t.bundle_id.eq_ignore_ascii_case(&target.bundle_id));
        self.targets.push(target);
    }

    /// Find the browser for a bundle identifier.
    pub fn lookup(&self, bundle_id: &str) -> Option<&BrowserTarget> {
        self.targets
            .iter()
            .find(|t| t.bundle_id.eq_ignore_ascii_case(bundle_id))
    }

    /// Registered browsers.
    pub fn targets(&self) -> &[BrowserTarget] {
        &self.targets
    }
}

/// Query and command a browser's active tab.
#[async_trait]
pub trait BrowserAutomationBridge: Send + Sync {
    /// URL of the active tab, `None` when the browser has no window.
    async fn active_tab_url(&self, target: &BrowserTarget) -> Result<Option<String>, BridgeError>;

    /// Point the active tab at `url`. Returns false when there was no window.
    async fn set_active_tab_url(&self, target: &BrowserTarget, url: &str) -> Result<bool, BridgeError>;

    /// Close the active tab. Returns false when there was no window.
    async fn close_active_tab(&self, target: &BrowserTarget) -> Result<bool, BridgeError>;
}

/// Bridge that runs AppleScript through `osascript`.
#[derive(Debug, Clone)]
pub struct AppleScriptBridge {
    timeout: Duration,
}

impl AppleScriptBridge {
    /// Create a bridge whose calls are bounded by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn run(&self, script: &str) -> Result<String, BridgeError> {
        trace!("osascript: {}", script);

        let mut cmd = Command::new("osascript");
        cmd.arg("-e").arg(script).kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| BridgeError::Timeout(self.timeout))?
            .map_err(BridgeError::Spawn)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(BridgeError::ScriptFailed(stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl BrowserAutomationBridge for AppleScriptBridge {
    async fn active_tab_url(&self, target: &BrowserTarget) -> Result<Option<String>, BridgeError> {
        let output = self.run(&target.family.get_url_script(&target.bundle_id)).await?;
        Ok(parse_url_output(&output))
    }

    async fn set_active_tab_url(&self, target: &BrowserTarget, url: &str) -> Result<bool, BridgeError> {
        let output = self
            .run(&target.family.set_url_script(&target.bundle_id, url))
            .await?;
        Ok(parse_bool_output(&output))
    }

    async fn close_active_tab(&self, target: &BrowserTarget) -> Result<bool, BridgeError> {
        let output = self
            .run(&target.family.close_tab_script(&target.bundle_id))
            .await?;
        Ok(parse_bool_output(&output))
    }
}

/// Escape a value for use inside an AppleScript string literal.
pub fn escape_applescript(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn parse_url_output(output: &str) -> Option<String> {
    let url = output.trim();
    // `missing value` is what a tab without a loaded page reports
    if url.is_empty() || url == "missing value" {
        None
    } else {
        Some(url.to_string())
    }
}

fn parse_bool_output(output: &str) -> bool {
    output.trim().eq_ignore_ascii_case("true")
}
