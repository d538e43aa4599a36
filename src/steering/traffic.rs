//! Enable and disable PAC steering around a focus session.
//!
//! The first `enable` records the system configuration it is about to
//! replace. `disable` puts that exact configuration back. If the prior state
//! is unknown, or restoring it fails, auto-proxy is switched off so no PAC is
//! left pointing at a proxy that is gone.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::error::SteeringError;
use super::pac::{PacDocument, pac_url};
use super::settings::{AutoProxyState, NetworkSettings};

/// What the system looked like before steering was enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PriorState {
    Known(AutoProxyState),
    Unknown,
}

/// Owner of the system auto-proxy configuration.
///
/// `enable`/`disable` are serialized by an internal lock, so two callers can
/// never interleave their changes.
pub struct TrafficSteering {
    settings: Arc<dyn NetworkSettings>,
    pac_path: PathBuf,
    prior: Mutex<Option<PriorState>>,
}

impl TrafficSteering {
    /// Create an inactive steering controller.
    pub fn new(settings: Arc<dyn NetworkSettings>, pac_path: PathBuf) -> Self {
        Self {
            settings,
            pac_path,
            prior: Mutex::new(None),
        }
    }

    /// Where the PAC file is written.
    pub fn pac_path(&self) -> &Path {
        &self.pac_path
    }

    /// Whether steering is currently applied.
    pub async fn is_active(&self) -> bool {
        self.prior.lock().await.is_some()
    }

    /// Generate a fresh PAC for `domains`, install it and turn auto-proxy on.
    ///
    /// Calling this again while active replaces the PAC but keeps the
    /// originally recorded prior state.
    pub async fn enable<I>(&self, domains: I, proxy_port: u16) -> Result<PacDocument, SteeringError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut prior = self.prior.lock().await;

        let pac = PacDocument::generate(domains, proxy_port);
        pac.write_to(&self.pac_path)?;
        debug!(
            "Wrote PAC for {} domains to {:?}",
            pac.domains().len(),
            self.pac_path
        );

        if prior.is_none() {
            let snapshot = self.blocking(|s| s.snapshot()).await;
            *prior = Some(match snapshot {
                Ok(state) => {
                    debug!("Recorded prior auto-proxy state: {:?}", state);
                    PriorState::Known(state)
                }
                Err(e) => {
                    warn!("Could not read current proxy settings, will disable on stop: {}", e);
                    PriorState::Unknown
                }
            });
        }

        let url = pac_url(&self.pac_path);
        let apply_url = url.clone();
        self.blocking(move |s| s.apply_pac(&apply_url)).await?;

        info!("Traffic steering enabled via {} ({})", self.settings.name(), url);
        Ok(pac)
    }

    /// Restore the configuration recorded by the first `enable`.
    ///
    /// Safe to call when not active. On [`SteeringError::Restore`] the
    /// system has been left with auto-proxy off.
    pub async fn disable(&self) -> Result<(), SteeringError> {
        let mut prior = self.prior.lock().await;
        let Some(state) = prior.take() else {
            return Ok(());
        };

        let result = match state {
            PriorState::Known(state) => {
                let target = state.clone();
                match self.blocking(move |s| s.restore(&target)).await {
                    Ok(()) => {
                        info!("Restored prior proxy settings");
                        Ok(())
                    }
                    Err(e) => {
                        warn!("Exact restore failed, turning auto-proxy off: {}", e);
                        self.force_off(e.to_string()).await
                    }
                }
            }
            PriorState::Unknown => match self.blocking(|s| s.disable()).await {
                Ok(()) => {
                    info!("Auto-proxy turned off (prior state unknown)");
                    Ok(())
                }
                Err(e) => Err(SteeringError::Restore(format!(
                    "auto-proxy could not be turned off: {}",
                    e
                ))),
            },
        };

        self.remove_pac_file();
        result
    }

    async fn force_off(&self, cause: String) -> Result<(), SteeringError> {
        match self.blocking(|s| s.disable()).await {
            Ok(()) => Err(SteeringError::Restore(cause)),
            Err(e) => Err(SteeringError::Restore(format!(
                "{}; auto-proxy could not be turned off either: {}",
                cause, e
            ))),
        }
    }

    fn remove_pac_file(&self) {
        match std::fs::remove_file(&self.pac_path) {
            Ok(()) => debug!("Removed PAC file {:?}", self.pac_path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove PAC file {:?}: {}", self.pac_path, e),
        }
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, SteeringError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn NetworkSettings) -> Result<T, SteeringError> + Send + 'static,
    {
        let settings = self.settings.clone();
        tokio::task::spawn_blocking(move || f(settings.as_ref()))
            .await
            .map_err(|e| SteeringError::Task(e.to_string()))?
    }
}

impl Drop for TrafficSteering {
    fn drop(&mut self) {
        let Some(state) = self.prior.get_mut().take() else {
            return;
        };

        warn!("Traffic steering dropped while active, restoring settings");
        let restored = match &state {
            PriorState::Known(state) => self.settings.restore(state),
            PriorState::Unknown => self.settings.disable(),
        };
        if let Err(e) = restored {
            warn!("Restore on drop failed, turning auto-proxy off: {}", e);
            if let Err(e) = self.settings.disable() {
                warn!("Failed to turn auto-proxy off: {}", e);
            }
        }
        self.remove_pac_file();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use tempfile::tempdir;

    /// In-memory settings with switchable failures.
    #[derive(Default)]
    struct FakeSettings {
        state: StdMutex<AutoProxyState>,
        fail_snapshot: bool,
        fail_restore: bool,
    }

    impl FakeSettings {
        fn with_state(state: AutoProxyState) -> Self {
            Self {
                state: StdMutex::new(state),
                ..Default::default()
            }
        }

        fn current(&self) -> AutoProxyState {
            self.state.lock().unwrap().clone()
        }
    }

    impl NetworkSettings for FakeSettings {
        fn name(&self) -> String {
            "fake".to_string()
        }

        fn snapshot(&self) -> Result<AutoProxyState, SteeringError> {
            if self.fail_snapshot {
                return Err(SteeringError::ToolNotFound("fake".to_string()));
            }
            Ok(self.current())
        }

        fn apply_pac(&self, url: &str) -> Result<(), SteeringError> {
            let mut state = self.state.lock().unwrap();
            state.url = Some(url.to_string());
            state.enabled = true;
            Ok(())
        }

        fn restore(&self, target: &AutoProxyState) -> Result<(), SteeringError> {
            if self.fail_restore {
                return Err(SteeringError::CommandError {
                    cmd: "restore".to_string(),
                    stderr: "denied".to_string(),
                });
            }
            *self.state.lock().unwrap() = target.clone();
            Ok(())
        }

        fn disable(&self) -> Result<(), SteeringError> {
            self.state.lock().unwrap().enabled = false;
            Ok(())
        }
    }

    fn corporate_pac() -> AutoProxyState {
        AutoProxyState {
            enabled: true,
            url: Some("http://wpad.corp/proxy.pac".to_string()),
            mode: None,
        }
    }

    #[tokio::test]
    async fn test_enable_then_disable_restores_exactly() {
        let dir = tempdir().unwrap();
        let settings = Arc::new(FakeSettings::with_state(corporate_pac()));
        let steering = TrafficSteering::new(settings.clone(), dir.path().join("focus.pac"));

        let pac = steering.enable(["youtube.com"], 8899).await.unwrap();
        assert_eq!(pac.route("www.youtube.com"), "PROXY 127.0.0.1:8899");
        assert!(settings.current().url.unwrap().starts_with("file://"));
        assert!(steering.pac_path().exists());

        steering.disable().await.unwrap();
        assert_eq!(settings.current(), corporate_pac());
        assert!(!steering.pac_path().exists());
    }

    #[tokio::test]
    async fn test_second_enable_keeps_original_prior_state() {
        let dir = tempdir().unwrap();
        let settings = Arc::new(FakeSettings::with_state(AutoProxyState::default()));
        let steering = TrafficSteering::new(settings.clone(), dir.path().join("focus.pac"));

        steering.enable(["a.com"], 8899).await.unwrap();
        steering.enable(["b.com"], 8899).await.unwrap();

        let written = std::fs::read_to_string(steering.pac_path()).unwrap();
        assert!(written.contains("b.com"));
        assert!(!written.contains("a.com"));

        steering.disable().await.unwrap();
        assert_eq!(settings.current(), AutoProxyState::default());
    }

    #[tokio::test]
    async fn test_unknown_prior_state_turns_proxy_off() {
        let dir = tempdir().unwrap();
        let settings = Arc::new(FakeSettings {
            fail_snapshot: true,
            ..Default::default()
        });
        let steering = TrafficSteering::new(settings.clone(), dir.path().join("focus.pac"));

        steering.enable(["a.com"], 8899).await.unwrap();
        assert!(settings.current().enabled);

        steering.disable().await.unwrap();
        assert!(!settings.current().enabled);
    }

    #[tokio::test]
    async fn test_failed_restore_leaves_proxy_off() {
        let dir = tempdir().unwrap();
        let settings = Arc::new(FakeSettings {
            state: StdMutex::new(corporate_pac()),
            fail_restore: true,
            ..Default::default()
        });
        let steering = TrafficSteering::new(settings.clone(), dir.path().join("focus.pac"));

        steering.enable(["a.com"], 8899).await.unwrap();
        let result = steering.disable().await;

        assert!(matches!(result, Err(SteeringError::Restore(_))));
        assert!(!settings.current().enabled);
        assert!(!steering.is_active().await);
    }

    #[tokio::test]
    async fn test_disable_when_inactive_is_noop() {
        let dir = tempdir().unwrap();
        let settings = Arc::new(FakeSettings::with_state(corporate_pac()));
        let steering = TrafficSteering::new(settings.clone(), dir.path().join("focus.pac"));

        steering.disable().await.unwrap();
        assert_eq!(settings.current(), corporate_pac());
    }

    #[tokio::test]
    async fn test_pac_write_failure_leaves_settings_untouched() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let settings = Arc::new(FakeSettings::with_state(corporate_pac()));
        let steering = TrafficSteering::new(settings.clone(), blocker.join("focus.pac"));

        let result = steering.enable(["a.com"], 8899).await;
        assert!(matches!(result, Err(SteeringError::PacWrite { .. })));
        assert_eq!(settings.current(), corporate_pac());
        assert!(!steering.is_active().await);
    }

    #[tokio::test]
    async fn test_drop_while_active_restores() {
        let dir = tempdir().unwrap();
        let settings = Arc::new(FakeSettings::with_state(corporate_pac()));
        {
            let steering = TrafficSteering::new(settings.clone(), dir.path().join("focus.pac"));
            steering.enable(["a.com"], 8899).await.unwrap();
        }
        assert_eq!(settings.current(), corporate_pac());
    }
}
