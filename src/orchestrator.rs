//! Focus session lifecycle.
//!
//! A [`FocusSession`] owns every enforcement subsystem and moves them through
//! `Idle -> Active -> Idle` together:
//!
//! ```text
//!              start(mode)
//!   ┌──────┐ ─────────────► ┌────────┐
//!   │ Idle │                │ Active │  apps + proxy + steering + tab watcher
//!   └──────┘ ◄───────────── └────────┘
//!                stop()
//! ```
//!
//! App blocking never depends on web blocking. If the proxy cannot bind or
//! the system proxy settings cannot be changed, the session still starts and
//! the failure is reported in the [`StartReport`].

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use thiserror::Error;
use tokio::sync::{Mutex, broadcast, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::apps::{
    AppSweepEnforcer, EnforcerConfig, PollingEventSource, ProcessControl, ProcessEventSource,
    SysinfoProcessControl, Termination,
};
use crate::blocklist::BlockList;
use crate::browser::{
    AppleScriptBridge, BlockedTab, BrowserAutomationBridge, BrowserRegistry, BrowserTabWatcher,
    ForegroundApp, platform_foreground,
};
use crate::config::{Config, FocusMode};
use crate::notify::{DesktopNotifier, FocusReminder, LogNotifier, Notifier, NotifyRateLimiter};
use crate::proxy::{BlockedHit, InterceptingProxy, ProxyConfig};
use crate::steering::{NetworkSettings, SteeringError, TrafficSteering, platform_settings};
use crate::telemetry::{AuditEvent, AuditLogger, HitSource};

/// Capacity of the engine event channel. Slow subscribers lose old events.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    /// Nothing is enforced.
    #[default]
    Idle,
    /// Enforcement is running.
    Active,
}

/// Something the engine did, for live observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A blocked site was stopped.
    BlockedHit {
        /// Blocked host.
        host: String,
        /// Layer that stopped it.
        source: HitSource,
    },
    /// A blocked application was terminated.
    AppTerminated {
        /// Application identifier.
        app: String,
        /// Whether it had to be killed.
        forced: bool,
    },
}

/// Enforcement subsystem names used in reports and audit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    /// Application sweep.
    Apps,
    /// Intercepting proxy.
    Proxy,
    /// System proxy settings.
    Steering,
    /// Browser tab watcher.
    Browser,
}

impl Subsystem {
    /// Name as written to logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Subsystem::Apps => "apps",
            Subsystem::Proxy => "proxy",
            Subsystem::Steering => "steering",
            Subsystem::Browser => "browser",
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A subsystem that failed to start or stop cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsystemFailure {
    /// Which subsystem.
    pub subsystem: Subsystem,
    /// What went wrong.
    pub message: String,
}

/// Result of a successful [`FocusSession::start`].
#[derive(Debug, Clone)]
pub struct StartReport {
    /// Identifier of the new session.
    pub session_id: Uuid,
    /// Address the proxy is listening on, if it started.
    pub proxy_addr: Option<SocketAddr>,
    /// Processes whose termination began during the initial sweep.
    pub terminated_on_start: usize,
    /// Subsystems that could not be brought up.
    pub failures: Vec<SubsystemFailure>,
}

impl StartReport {
    /// Whether every subsystem came up.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Whether a given subsystem failed.
    pub fn failed(&self, subsystem: Subsystem) -> bool {
        self.failures.iter().any(|f| f.subsystem == subsystem)
    }
}

/// Result of [`FocusSession::stop`].
#[derive(Debug, Clone)]
pub struct StopReport {
    /// Identifier of the session that ended.
    pub session_id: Uuid,
    /// How long it ran.
    pub duration: Duration,
    /// Subsystems that did not shut down cleanly.
    pub failures: Vec<SubsystemFailure>,
}

/// Session lifecycle errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// `start` was called while a session is running.
    #[error("A focus session is already active ({0})")]
    AlreadyActive(String),

    /// `stop` was called with no session running.
    #[error("No focus session is active")]
    NotActive,
}

/// Platform collaborators the engine drives.
///
/// Everything that touches the OS sits behind one of these traits so tests
/// can substitute in-memory versions.
pub struct EngineDeps {
    /// Process inventory and termination.
    pub process_control: Arc<dyn ProcessControl>,
    /// Launch/activation notifications.
    pub process_events: Arc<dyn ProcessEventSource>,
    /// System auto-proxy settings. `None` when no backend is available.
    pub network_settings: Option<Arc<dyn NetworkSettings>>,
    /// Frontmost application lookup.
    pub foreground: Arc<dyn ForegroundApp>,
    /// Browser scripting bridge.
    pub bridge: Arc<dyn BrowserAutomationBridge>,
    /// Reminder delivery.
    pub notifier: Arc<dyn Notifier>,
    /// Audit sink.
    pub audit: Arc<AuditLogger>,
}

impl EngineDeps {
    /// Real implementations for the current platform.
    pub fn platform(config: &Config, audit: Arc<AuditLogger>) -> Self {
        let timeout = config.browser.script_timeout();
        let foreground = platform_foreground(timeout);
        let process_control: Arc<dyn ProcessControl> = Arc::new(SysinfoProcessControl::new());
        let process_events = Arc::new(
            PollingEventSource::new(process_control.clone()).with_foreground(foreground.clone()),
        );

        let network_settings = if config.steering.enabled() {
            match platform_settings(config.steering.network_service()) {
                Ok(settings) => Some(settings),
                Err(e) => {
                    warn!("System proxy settings unavailable: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let notifier: Arc<dyn Notifier> = if config.notify.enabled() {
            Arc::new(DesktopNotifier)
        } else {
            Arc::new(LogNotifier)
        };

        Self {
            process_control,
            process_events,
            network_settings,
            foreground,
            bridge: Arc::new(AppleScriptBridge::new(timeout)),
            notifier,
            audit,
        }
    }
}

/// Subsystems of a running session.
struct ActiveSession {
    id: Uuid,
    mode: FocusMode,
    started_at: Instant,
    enforcer: AppSweepEnforcer,
    proxy: Option<InterceptingProxy>,
    steering: Option<TrafficSteering>,
    watcher: Option<BrowserTabWatcher>,
}

/// Orchestrates one focus session at a time.
///
/// Methods take `&self`, so a session can be shared behind an `Arc` between
/// a control surface and a timer.
pub struct FocusSession {
    config: Config,
    deps: EngineDeps,
    active: Mutex<Option<ActiveSession>>,
    status_tx: watch::Sender<SessionStatus>,
    events_tx: broadcast::Sender<EngineEvent>,
}

impl FocusSession {
    /// Create an idle session controller.
    pub fn new(config: Config, deps: EngineDeps) -> Self {
        let (status_tx, _) = watch::channel(SessionStatus::Idle);
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            deps,
            active: Mutex::new(None),
            status_tx,
            events_tx,
        }
    }

    /// Current status.
    pub fn status(&self) -> SessionStatus {
        *self.status_tx.borrow()
    }

    /// Watch status transitions.
    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    /// Receive engine events from now on.
    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events_tx.subscribe()
    }

    /// Begin enforcing `mode`.
    ///
    /// The mode is copied in; later edits to the source profile do not affect
    /// this session. Fails only when a session is already active. Subsystem
    /// failures are returned in the report.
    pub async fn start(&self, mode: FocusMode) -> Result<StartReport, SessionError> {
        let mut active = self.active.lock().await;
        if let Some(current) = active.as_ref() {
            return Err(SessionError::AlreadyActive(current.mode.name.clone()));
        }

        let session_id = Uuid::new_v4();
        let enforcer_config = EnforcerConfig::from_config(&self.config.apps);
        let blocklist = Arc::new(
            BlockList::from_mode(&mode)
                .without_apps(enforcer_config.allowlist.iter().map(String::as_str)),
        );
        info!(
            "Starting focus session '{}' ({} apps, {} domains)",
            mode.name,
            blocklist.apps().len(),
            blocklist.domains().len()
        );

        let limiter = Arc::new(NotifyRateLimiter::new(self.config.notify.cooldown()));
        let reminder = FocusReminder::new(limiter, self.deps.notifier.clone(), &mode.name);
        let mut failures = Vec::new();

        let mut enforcer = AppSweepEnforcer::new(
            self.deps.process_control.clone(),
            self.deps.process_events.clone(),
            enforcer_config,
        )
        .on_terminated(self.termination_hook());
        let terminated_on_start = match enforcer.start(blocklist.clone(), reminder.clone()) {
            Ok(count) => count,
            Err(e) => {
                failures.push(SubsystemFailure {
                    subsystem: Subsystem::Apps,
                    message: e.to_string(),
                });
                0
            }
        };

        let mut proxy = None;
        let mut proxy_addr = None;
        let mut steering = None;
        let mut watcher = None;

        if blocklist.domains().is_empty() {
            debug!("No blocked domains, web enforcement not started");
        } else {
            let mut server = InterceptingProxy::new(
                ProxyConfig::from_settings(&self.config.proxy),
                host_predicate(blocklist.clone()),
                self.proxy_hit_hook(reminder.clone()),
            );
            match server.start().await {
                Ok(addr) => {
                    proxy_addr = Some(addr);
                    proxy = Some(server);
                }
                Err(e) => failures.push(SubsystemFailure {
                    subsystem: Subsystem::Proxy,
                    message: e.to_string(),
                }),
            }

            // Steering to a proxy that is not listening would break browsing
            if let Some(addr) = proxy_addr {
                match self.start_steering(&blocklist, addr.port()).await {
                    Ok(Some(s)) => steering = Some(s),
                    Ok(None) => {}
                    Err(message) => failures.push(SubsystemFailure {
                        subsystem: Subsystem::Steering,
                        message,
                    }),
                }
            }

            if !self.config.browser.enabled() {
                debug!("Tab watcher disabled");
            } else if !self.deps.foreground.is_available() {
                failures.push(SubsystemFailure {
                    subsystem: Subsystem::Browser,
                    message: "frontmost application cannot be determined on this platform".to_string(),
                });
            } else {
                let mut tab_watcher = BrowserTabWatcher::new(
                    self.deps.foreground.clone(),
                    self.deps.bridge.clone(),
                    BrowserRegistry::default(),
                    self.config.browser.poll_interval(),
                )
                .on_blocked(self.tab_hit_hook());
                tab_watcher.start(blocklist.clone(), self.config.browser.action(), reminder);
                watcher = Some(tab_watcher);
            }
        }

        self.deps.audit.log(AuditEvent::SessionStart {
            session: mode.name.clone(),
            mode_id: mode.id.to_string(),
            apps: blocklist.apps().len(),
            domains: blocklist.domains().len(),
        });
        for failure in &failures {
            error!("{} failed to start: {}", failure.subsystem, failure.message);
            self.deps.audit.log(AuditEvent::SubsystemFailed {
                subsystem: failure.subsystem.to_string(),
                message: failure.message.clone(),
            });
        }

        *active = Some(ActiveSession {
            id: session_id,
            mode,
            started_at: Instant::now(),
            enforcer,
            proxy,
            steering,
            watcher,
        });
        self.status_tx.send_replace(SessionStatus::Active);

        Ok(StartReport {
            session_id,
            proxy_addr,
            terminated_on_start,
            failures,
        })
    }

    /// Tear down every subsystem and return to idle.
    ///
    /// Every subsystem is stopped even if another fails. Returns
    /// [`SessionError::NotActive`] without side effects when idle.
    pub async fn stop(&self) -> Result<StopReport, SessionError> {
        let mut active = self.active.lock().await;
        let Some(mut session) = active.take() else {
            return Err(SessionError::NotActive);
        };

        let mut failures = Vec::new();

        session.enforcer.stop();
        if let Some(mut watcher) = session.watcher.take() {
            watcher.stop();
        }

        // Restore settings first so browsers never point at a closed port
        if let Some(steering) = session.steering.take()
            && let Err(e) = steering.disable().await
        {
            let message = e.to_string();
            if matches!(e, SteeringError::Restore(_)) {
                self.deps.audit.log(AuditEvent::ProxyRestoreFailed {
                    message: message.clone(),
                });
            }
            error!("Proxy settings not restored: {}", message);
            failures.push(SubsystemFailure {
                subsystem: Subsystem::Steering,
                message,
            });
        }

        if let Some(mut proxy) = session.proxy.take() {
            proxy.stop().await;
        }

        let duration = session.started_at.elapsed();
        self.deps.audit.log(AuditEvent::SessionEnd {
            session: session.mode.name.clone(),
            duration_sec: duration.as_secs(),
        });
        self.status_tx.send_replace(SessionStatus::Idle);
        info!(
            "Focus session '{}' ended after {}s",
            session.mode.name,
            duration.as_secs()
        );

        Ok(StopReport {
            session_id: session.id,
            duration,
            failures,
        })
    }

    /// Enable PAC steering. `Ok(None)` means steering is turned off in config.
    async fn start_steering(
        &self,
        blocklist: &BlockList,
        port: u16,
    ) -> Result<Option<TrafficSteering>, String> {
        if !self.config.steering.enabled() {
            info!("Steering disabled, system proxy settings left untouched");
            return Ok(None);
        }
        let Some(settings) = self.deps.network_settings.clone() else {
            return Err("no system proxy settings backend available".to_string());
        };

        let steering = TrafficSteering::new(settings, self.config.steering.pac_path());
        match steering.enable(blocklist.domains(), port).await {
            Ok(_) => Ok(Some(steering)),
            Err(e) => {
                // A partially applied PAC must not outlive the failed start
                if let Err(restore) = steering.disable().await {
                    warn!("Cleanup after failed steering start: {}", restore);
                }
                Err(e.to_string())
            }
        }
    }

    fn termination_hook(&self) -> Arc<dyn Fn(&Termination) + Send + Sync> {
        let audit = self.deps.audit.clone();
        let events = self.events_tx.clone();
        Arc::new(move |t: &Termination| {
            audit.log(AuditEvent::AppTerminated {
                app: t.app_id.clone(),
                pid: t.pid,
                forced: t.forced,
            });
            let _ = events.send(EngineEvent::AppTerminated {
                app: t.app_id.clone(),
                forced: t.forced,
            });
        })
    }

    fn proxy_hit_hook(&self, reminder: FocusReminder) -> Arc<dyn Fn(&BlockedHit) + Send + Sync> {
        let audit = self.deps.audit.clone();
        let events = self.events_tx.clone();
        Arc::new(move |hit: &BlockedHit| {
            record_site_blocked(&audit, &events, &hit.host, hit.via);
            reminder.remind();
        })
    }

    fn tab_hit_hook(&self) -> Arc<dyn Fn(&BlockedTab) + Send + Sync> {
        let audit = self.deps.audit.clone();
        let events = self.events_tx.clone();
        Arc::new(move |tab: &BlockedTab| {
            record_site_blocked(&audit, &events, &tab.host, HitSource::BrowserTab);
        })
    }
}

fn host_predicate(blocklist: Arc<BlockList>) -> Arc<dyn Fn(&str) -> bool + Send + Sync> {
    Arc::new(move |host: &str| blocklist.is_host_blocked(host))
}

fn record_site_blocked(
    audit: &AuditLogger,
    events: &broadcast::Sender<EngineEvent>,
    host: &str,
    source: HitSource,
) {
    audit.log(AuditEvent::SiteBlocked {
        host: host.to_string(),
        via: source,
    });
    let _ = events.send(EngineEvent::BlockedHit {
        host: host.to_string(),
        source,
    });
}

/// Run one session from the command line.
///
/// Enforces `mode` until `duration` elapses, Ctrl-C is pressed or SIGTERM
/// arrives, then stops and restores the system proxy settings.
pub async fn run_session(session: &FocusSession, mode: FocusMode, duration: Option<Duration>) -> Result<()> {
    let name = mode.name.clone();
    let report = session.start(mode).await?;

    println!("Focus mode '{}' is on (session {})", name, report.session_id);
    if let Some(addr) = report.proxy_addr {
        println!("  proxy:    {}", addr);
    }
    println!("  stopped on start: {} process(es)", report.terminated_on_start);
    for failure in &report.failures {
        println!("  \x1b[33mwarning:\x1b[0m {} unavailable: {}", failure.subsystem, failure.message);
    }

    let deadline = async move {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    match duration {
        Some(duration) => println!("Ends in {}s. Press Ctrl-C to end early.", duration.as_secs()),
        None => println!("Press Ctrl-C to end the session."),
    }

    tokio::select! {
        _ = deadline => info!("Session time is up"),
        signal = shutdown_signal() => info!("Received {}, ending session", signal),
    }

    let report = session.stop().await?;
    println!(
        "Focus mode '{}' is off after {}s",
        name,
        report.duration.as_secs()
    );
    for failure in &report.failures {
        println!("  \x1b[31merror:\x1b[0m {}: {}", failure.subsystem, failure.message);
    }
    Ok(())
}

/// Wait for Ctrl-C or, on Unix, SIGTERM. Returns the signal's name.
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Could not wait for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Could not install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "Ctrl-C",
        _ = terminate => "SIGTERM",
    }
}
