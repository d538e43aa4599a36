//! Rate-limited focus reminders.
//!
//! Every forced termination and every blocked tab asks for a reminder, but at
//! most one reminder is shown per cool-down window no matter how many
//! enforcement tasks ask at the same time.
//!
//! # Example
//!
//! ```ignore
//! use focus_warden::notify::{FocusReminder, LogNotifier, NotifyRateLimiter};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let limiter = Arc::new(NotifyRateLimiter::new(Duration::from_secs(10)));
//! let reminder = FocusReminder::new(limiter, Arc::new(LogNotifier), "Deep Work");
//! assert!(reminder.remind());
//! assert!(!reminder.remind());
//! ```

use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

/// Title used for every reminder.
pub const REMINDER_TITLE: &str = "Remember";

/// Shared "last fired at" gate.
///
/// The check and the update happen under one lock, so two tasks racing for
/// the same window see exactly one success.
#[derive(Debug)]
pub struct NotifyRateLimiter {
    cooldown: Duration,
    last_fire: Mutex<Option<Instant>>,
}

impl NotifyRateLimiter {
    /// Create a limiter with the given cool-down window.
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_fire: Mutex::new(None),
        }
    }

    /// Cool-down window.
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Claim the current window. Returns false if a reminder already fired in it.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// Claim the window that contains `now`.
    pub fn try_acquire_at(&self, now: Instant) -> bool {
        let mut last = self.last_fire.lock().unwrap();
        match *last {
            Some(prev) if now.saturating_duration_since(prev) < self.cooldown => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

/// Something that can put a message in front of the user.
pub trait Notifier: Send + Sync {
    /// Show a notification. Failures are logged by the implementation.
    fn notify(&self, title: &str, body: &str);
}

/// Desktop notifications through the platform's command-line helper.
///
/// macOS uses `osascript`, other platforms use `notify-send`. The helper runs
/// on a detached thread so callers inside the runtime never block on it.
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopNotifier;

impl DesktopNotifier {
    fn command(title: &str, body: &str) -> Command {
        if cfg!(target_os = "macos") {
            let script = format!(
                r#"display notification "{}" with title "{}""#,
                escape_quoted(body),
                escape_quoted(title)
            );
            let mut cmd = Command::new("osascript");
            cmd.arg("-e").arg(script);
            cmd
        } else {
            let mut cmd = Command::new("notify-send");
            cmd.arg("--app-name=focus-warden").arg(title).arg(body);
            cmd
        }
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, title: &str, body: &str) {
        let mut cmd = Self::command(title, body);
        let fallback = format!("{}: {}", title, body);

        std::thread::spawn(move || match cmd.output() {
            Ok(output) if output.status.success() => {
                debug!("Delivered notification");
            }
            Ok(output) => {
                warn!(
                    "Notification helper exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                info!("{}", fallback);
            }
            Err(e) => {
                debug!("Notification helper unavailable: {}", e);
                info!("{}", fallback);
            }
        });
    }
}

/// Writes reminders to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) {
        info!("{}: {}", title, body);
    }
}

/// Reminder bound to one session: shared limiter, notifier and mode name.
#[derive(Clone)]
pub struct FocusReminder {
    limiter: Arc<NotifyRateLimiter>,
    notifier: Arc<dyn Notifier>,
    mode_name: String,
}

impl FocusReminder {
    /// Create a reminder for a session.
    pub fn new(limiter: Arc<NotifyRateLimiter>, notifier: Arc<dyn Notifier>, mode_name: &str) -> Self {
        Self {
            limiter,
            notifier,
            mode_name: mode_name.to_string(),
        }
    }

    /// Notification body for this session.
    pub fn body(&self) -> String {
        format!("{} is on!", self.mode_name)
    }

    /// Show the reminder unless one was shown within the cool-down window.
    ///
    /// Returns whether a notification was sent.
    pub fn remind(&self) -> bool {
        if !self.limiter.try_acquire() {
            debug!("Reminder suppressed by cool-down");
            return false;
        }
        self.notifier.notify(REMINDER_TITLE, &self.body());
        true
    }
}

impl std::fmt::Debug for FocusReminder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FocusReminder")
            .field("limiter", &self.limiter)
            .field("mode_name", &self.mode_name)
            .finish()
    }
}

fn escape_quoted(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
