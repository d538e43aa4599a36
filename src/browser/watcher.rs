//! Periodic inspection of the foreground browser's active tab.
//!
//! The proxy only sees traffic the browser actually sends through it. Cached
//! pages, service workers and reused connections slip past, so the watcher
//! also asks the browser which page it is showing and acts on blocked ones.
//!
//! Every failure inside a tick (no permission, no windows, script timeout) is
//! logged and the next tick runs as usual.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::bridge::{BrowserAutomationBridge, BrowserRegistry, BrowserTarget};
use super::foreground::ForegroundApp;
use crate::blocklist::{BlockList, url_host};
use crate::notify::FocusReminder;

/// Neutral page a blocked tab is sent to.
pub const BLANK_PAGE: &str = "about:blank";

/// What to do with a tab showing a blocked site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabAction {
    /// Navigate the tab to [`BLANK_PAGE`].
    #[default]
    NavigateBlank,
    /// Close the tab.
    CloseTab,
}

/// A blocked tab the watcher acted on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedTab {
    /// Browser display name.
    pub browser: String,
    /// Matched host.
    pub host: String,
    /// Full URL that was showing.
    pub url: String,
    /// Action applied.
    pub action: TabAction,
}

/// Callback invoked after a blocked tab was handled.
pub type TabHitHook = Arc<dyn Fn(&BlockedTab) + Send + Sync>;

/// Result of one inspection tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabOutcome {
    /// The foreground app is unknown or not a supported browser.
    NotBrowser,
    /// The browser has no window or no page loaded.
    NoTab,
    /// The page is allowed.
    Allowed,
    /// A blocked page was handled.
    Blocked(BlockedTab),
    /// A bridge call failed; retried next tick.
    Failed,
}

/// State shared by the polling task.
struct WatchContext {
    foreground: Arc<dyn ForegroundApp>,
    bridge: Arc<dyn BrowserAutomationBridge>,
    registry: BrowserRegistry,
    blocklist: Arc<BlockList>,
    action: TabAction,
    reminder: FocusReminder,
    on_blocked: Option<TabHitHook>,
}

impl WatchContext {
    async fn inspect_once(&self) -> TabOutcome {
        let Some(bundle_id) = self.foreground.frontmost_bundle_id().await else {
            return TabOutcome::NotBrowser;
        };
        let Some(target) = self.registry.lookup(&bundle_id) else {
            return TabOutcome::NotBrowser;
        };

        let url = match self.bridge.active_tab_url(target).await {
            Ok(Some(url)) => url,
            Ok(None) => return TabOutcome::NoTab,
            Err(e) => {
                debug!("Could not read active tab of {}: {}", target.name, e);
                return TabOutcome::Failed;
            }
        };

        let Some(host) = url_host(&url) else {
            return TabOutcome::Allowed;
        };
        if !self.blocklist.is_host_blocked(&host) {
            return TabOutcome::Allowed;
        }

        match self.apply(target).await {
            Some(true) => {}
            Some(false) => return TabOutcome::NoTab,
            None => return TabOutcome::Failed,
        }

        let tab = BlockedTab {
            browser: target.name.clone(),
            host,
            url,
            action: self.action,
        };
        info!("Blocked tab in {}: {} ({:?})", tab.browser, tab.host, tab.action);

        self.reminder.remind();
        if let Some(hook) = &self.on_blocked {
            hook(&tab);
        }
        TabOutcome::Blocked(tab)
    }

    /// Apply the configured action. `None` means the bridge call failed.
    async fn apply(&self, target: &BrowserTarget) -> Option<bool> {
        let result = match self.action {
            TabAction::NavigateBlank => self.bridge.set_active_tab_url(target, BLANK_PAGE).await,
            TabAction::CloseTab => self.bridge.close_active_tab(target).await,
        };
        match result {
            Ok(done) => Some(done),
            Err(e) => {
                warn!("Failed to {:?} in {}: {}", self.action, target.name, e);
                None
            }
        }
    }
}

/// Background task of an active watcher.
struct RunningWatch {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Polls the foreground browser and enforces the block list on its tabs.
pub struct BrowserTabWatcher {
    foreground: Arc<dyn ForegroundApp>,
    bridge: Arc<dyn BrowserAutomationBridge>,
    registry: BrowserRegistry,
    poll_interval: Duration,
    on_blocked: Option<TabHitHook>,
    running: Option<RunningWatch>,
}

impl BrowserTabWatcher {
    /// Create an idle watcher.
    pub fn new(
        foreground: Arc<dyn ForegroundApp>,
        bridge: Arc<dyn BrowserAutomationBridge>,
        registry: BrowserRegistry,
        poll_interval: Duration,
    ) -> Self {
        Self {
            foreground,
            bridge,
            registry,
            poll_interval,
            on_blocked: None,
            running: None,
        }
    }

    /// Register a callback for handled tabs.
    pub fn on_blocked(mut self, hook: TabHitHook) -> Self {
        self.on_blocked = Some(hook);
        self
    }

    /// Whether polling is active.
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Begin polling. Must be called inside a Tokio runtime.
    ///
    /// Calling this while running restarts polling with the new settings.
    pub fn start(&mut self, blocklist: Arc<BlockList>, action: TabAction, reminder: FocusReminder) {
        self.stop();

        let ctx = WatchContext {
            foreground: self.foreground.clone(),
            bridge: self.bridge.clone(),
            registry: self.registry.clone(),
            blocklist,
            action,
            reminder,
            on_blocked: self.on_blocked.clone(),
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(watch_loop(ctx, self.poll_interval, shutdown_rx));

        info!(
            "Browser tab watcher started (every {:?}, {:?})",
            self.poll_interval, action
        );
        self.running = Some(RunningWatch { shutdown_tx, task });
    }

    /// Halt polling. Safe to call when not running.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        let _ = running.shutdown_tx.send(true);
        running.task.abort();
        info!("Browser tab watcher stopped");
    }
}

impl Drop for BrowserTabWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn watch_loop(ctx: WatchContext, period: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let outcome = ctx.inspect_once().await;
                if outcome == TabOutcome::Failed {
                    debug!("Tab inspection failed, retrying next tick");
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    debug!("Tab watcher received shutdown signal");
                    break;
                }
            }
        }
    }
}
