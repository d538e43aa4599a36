//! Browser tab enforcement through the platform scripting bridge.
//!
//! A second, independent layer next to the proxy: instead of judging the
//! traffic a browser sends, it asks the browser which page it is showing.
//!
//! # Example
//!
//! ```ignore
//! use focus_warden::browser::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let timeout = Duration::from_millis(1500);
//! let mut watcher = BrowserTabWatcher::new(
//!     platform_foreground(timeout),
//!     Arc::new(AppleScriptBridge::new(timeout)),
//!     BrowserRegistry::default(),
//!     Duration::from_millis(400),
//! );
//! watcher.start(blocklist, TabAction::NavigateBlank, reminder);
//! ```

pub mod bridge;
pub mod error;
pub mod foreground;
pub mod watcher;

pub use bridge::{
    AppleScriptBridge, BrowserAutomationBridge, BrowserFamily, BrowserRegistry, BrowserTarget,
    escape_applescript,
};
pub use error::BridgeError;
pub use foreground::{ForegroundApp, NoForeground, SystemEventsForeground, platform_foreground};
pub use watcher::{BLANK_PAGE, BlockedTab, BrowserTabWatcher, TabAction, TabHitHook, TabOutcome};
