//! Which application is in front.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Reports the bundle identifier of the frontmost application.
#[async_trait]
pub trait ForegroundApp: Send + Sync {
    /// Bundle identifier, or `None` when it cannot be determined.
    async fn frontmost_bundle_id(&self) -> Option<String>;

    /// Whether this source can ever report an application.
    fn is_available(&self) -> bool {
        true
    }
}

/// Asks System Events through `osascript` (macOS).
#[derive(Debug, Clone)]
pub struct SystemEventsForeground {
    timeout: Duration,
}

const FRONTMOST_SCRIPT: &str = r#"tell application "System Events" to get bundle identifier of first application process whose frontmost is true"#;

impl SystemEventsForeground {
    /// Create a lookup whose calls are bounded by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ForegroundApp for SystemEventsForeground {
    async fn frontmost_bundle_id(&self) -> Option<String> {
        let mut cmd = Command::new("osascript");
        cmd.arg("-e").arg(FRONTMOST_SCRIPT).kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                debug!("Foreground query failed to start: {}", e);
                return None;
            }
            Err(_) => {
                debug!("Foreground query timed out");
                return None;
            }
        };

        if !output.status.success() {
            debug!(
                "Foreground query failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return None;
        }

        let bundle_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!bundle_id.is_empty() && bundle_id != "missing value").then_some(bundle_id)
    }
}

/// Never reports a foreground application. Used where no lookup exists.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoForeground;

#[async_trait]
impl ForegroundApp for NoForeground {
    async fn frontmost_bundle_id(&self) -> Option<String> {
        None
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// Foreground lookup for the current platform.
pub fn platform_foreground(timeout: Duration) -> Arc<dyn ForegroundApp> {
    if cfg!(target_os = "macos") {
        Arc::new(SystemEventsForeground::new(timeout))
    } else {
        Arc::new(NoForeground)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_foreground() {
        assert_eq!(NoForeground.frontmost_bundle_id().await, None);
        assert!(!NoForeground.is_available());
        assert!(SystemEventsForeground::new(Duration::from_millis(10)).is_available());
    }

    #[test]
    fn test_frontmost_script() {
        assert!(FRONTMOST_SCRIPT.contains("System Events"));
        assert!(FRONTMOST_SCRIPT.contains("whose frontmost is true"));
    }
}
