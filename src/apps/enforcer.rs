//! Application sweep enforcement.
//!
//! While a session is active, every process whose identifier is blocked is
//! asked to exit, then killed if it is still around after a short grace
//! window. Three paths feed the same check:
//!
//! 1. An immediate inventory when enforcement starts
//! 2. Launch/activation events from a [`ProcessEventSource`]
//! 3. A periodic re-sweep that catches anything the events missed
//!
//! A fixed safety allow-list is never terminated, whatever the block list says.
//!
//! # Example
//!
//! ```ignore
//! use focus_warden::apps::{AppSweepEnforcer, EnforcerConfig, PollingEventSource, SysinfoProcessControl};
//! use std::sync::Arc;
//!
//! let control = Arc::new(SysinfoProcessControl::new());
//! let events = Arc::new(PollingEventSource::new(control.clone()));
//! let mut enforcer = AppSweepEnforcer::new(control, events, EnforcerConfig::default());
//!
//! enforcer.start(blocklist, reminder)?;
//! // ...
//! enforcer.stop();
//! ```

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::error::ProcessError;
use super::events::{ProcessEventSource, ProcessSubscription};
use super::process::{ProcessControl, RunningProcess};
use crate::blocklist::BlockList;
use crate::config::AppsConfig;
use crate::notify::FocusReminder;

/// Identifiers that are never terminated.
pub const BUILTIN_ALLOWLIST: &[&str] = &[
    env!("CARGO_PKG_NAME"),
    "Finder",
    "Terminal",
    "com.apple.finder",
    "com.apple.Terminal",
];

/// Outcome of one termination, reported after the grace window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Termination {
    /// Application identifier.
    pub app_id: String,
    /// Process ID.
    pub pid: u32,
    /// Whether the process survived the grace window and was killed.
    pub forced: bool,
}

/// Callback invoked for every completed termination.
pub type TerminationHook = Arc<dyn Fn(&Termination) + Send + Sync>;

/// Enforcer tuning.
#[derive(Debug, Clone)]
pub struct EnforcerConfig {
    /// Interval between safety-net sweeps.
    pub sweep_interval: Duration,
    /// Wait between graceful and forced termination.
    pub grace: Duration,
    /// Identifiers that are never terminated.
    pub allowlist: BTreeSet<String>,
}

impl EnforcerConfig {
    /// Build from the `[apps]` config section plus the built-in allow-list.
    pub fn from_config(apps: &AppsConfig) -> Self {
        let mut config = Self {
            sweep_interval: apps.sweep_interval(),
            grace: apps.grace(),
            ..Default::default()
        };
        config.allowlist.extend(apps.allowlist.iter().cloned());
        config
    }
}

impl Default for EnforcerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_millis(700),
            grace: Duration::from_millis(250),
            allowlist: BUILTIN_ALLOWLIST.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// State shared by the sweep loop, the event loop and escalation tasks.
struct SweepContext {
    control: Arc<dyn ProcessControl>,
    blocklist: Arc<BlockList>,
    allowlist: BTreeSet<String>,
    grace: Duration,
    reminder: FocusReminder,
    on_terminated: Option<TerminationHook>,
    /// PIDs with an escalation in flight.
    pending: Mutex<HashSet<u32>>,
    shutdown_rx: watch::Receiver<bool>,
    own_pid: u32,
}

impl SweepContext {
    fn should_terminate(&self, process: &RunningProcess) -> bool {
        let mut ids = process.identifiers();
        process.pid != self.own_pid
            && ids.clone().any(|id| self.blocklist.is_app_blocked(id))
            && !ids.any(|id| self.allowlist.contains(id))
    }

    /// Full inventory pass. Returns how many terminations were started.
    fn sweep(self: &Arc<Self>) -> Result<usize, ProcessError> {
        let processes = self.control.snapshot()?;
        Ok(processes.iter().filter(|p| self.enforce(p)).count())
    }

    /// Start terminating one process if it is blocked.
    fn enforce(self: &Arc<Self>, process: &RunningProcess) -> bool {
        if !self.should_terminate(process) {
            return false;
        }
        if !self.pending.lock().unwrap().insert(process.pid) {
            return false;
        }

        info!(
            "Terminating blocked app {} (pid {})",
            process.app_id, process.pid
        );
        if let Err(e) = self.control.terminate(process.pid) {
            debug!("Graceful termination of {} failed: {}", process.pid, e);
        }

        let ctx = self.clone();
        let process = process.clone();
        tokio::spawn(async move { ctx.escalate(process).await });
        true
    }

    /// After the grace window, kill the process if it survived.
    async fn escalate(self: Arc<Self>, process: RunningProcess) {
        let mut shutdown_rx = self.shutdown_rx.clone();
        let cancelled = tokio::select! {
            _ = tokio::time::sleep(self.grace) => false,
            _ = shutdown_rx.wait_for(|stop| *stop) => true,
        };

        if !cancelled {
            let forced = if self.control.is_running(process.pid) {
                match self.control.force_terminate(process.pid) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("Forced termination of {} failed: {}", process.pid, e);
                        false
                    }
                }
            } else {
                false
            };

            if forced {
                info!("Force-terminated {} (pid {})", process.app_id, process.pid);
                self.reminder.remind();
            }

            if let Some(hook) = &self.on_terminated {
                hook(&Termination {
                    app_id: process.app_id.clone(),
                    pid: process.pid,
                    forced,
                });
            }
        }

        self.pending.lock().unwrap().remove(&process.pid);
    }
}

/// Background tasks of an active enforcer.
struct RunningSweep {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

/// Terminates blocked applications for the lifetime of a session.
pub struct AppSweepEnforcer {
    control: Arc<dyn ProcessControl>,
    events: Arc<dyn ProcessEventSource>,
    config: EnforcerConfig,
    on_terminated: Option<TerminationHook>,
    running: Option<RunningSweep>,
}

impl AppSweepEnforcer {
    /// Create an idle enforcer.
    pub fn new(
        control: Arc<dyn ProcessControl>,
        events: Arc<dyn ProcessEventSource>,
        config: EnforcerConfig,
    ) -> Self {
        Self {
            control,
            events,
            config,
            on_terminated: None,
            running: None,
        }
    }

    /// Register a callback for completed terminations.
    pub fn on_terminated(mut self, hook: TerminationHook) -> Self {
        self.on_terminated = Some(hook);
        self
    }

    /// Whether enforcement is active.
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Begin enforcement. Must be called inside a Tokio runtime.
    ///
    /// Calling this while already running restarts enforcement with the new
    /// block list. Returns how many terminations the initial inventory started.
    ///
    /// If the initial inventory fails the error is returned, but enforcement
    /// is still running and the periodic sweep retries.
    pub fn start(
        &mut self,
        blocklist: Arc<BlockList>,
        reminder: FocusReminder,
    ) -> Result<usize, ProcessError> {
        self.stop();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ctx = Arc::new(SweepContext {
            control: self.control.clone(),
            blocklist,
            allowlist: self.config.allowlist.clone(),
            grace: self.config.grace,
            reminder,
            on_terminated: self.on_terminated.clone(),
            pending: Mutex::new(HashSet::new()),
            shutdown_rx: shutdown_rx.clone(),
            own_pid: std::process::id(),
        });

        let initial = ctx.sweep();
        match &initial {
            Ok(count) => info!(
                "App enforcement started ({} apps blocked, {} terminated on start)",
                ctx.blocklist.apps().len(),
                count
            ),
            Err(e) => warn!("Initial app sweep failed, retrying periodically: {}", e),
        }

        let sweep_task = tokio::spawn(sweep_loop(
            ctx.clone(),
            self.config.sweep_interval,
            shutdown_rx.clone(),
        ));

        let subscription = self.events.subscribe();
        let event_task = tokio::spawn(event_loop(ctx, subscription, shutdown_rx));

        self.running = Some(RunningSweep {
            shutdown_tx,
            tasks: vec![sweep_task, event_task],
        });
        initial
    }

    /// Halt enforcement. Safe to call when not running.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        let _ = running.shutdown_tx.send(true);
        for task in running.tasks {
            task.abort();
        }
        info!("App enforcement stopped");
    }
}

impl Drop for AppSweepEnforcer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweep_loop(ctx: Arc<SweepContext>, period: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    // The initial sweep already ran synchronously in `start`
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let ctx = ctx.clone();
                // Inventory walks the whole process table
                match tokio::task::spawn_blocking(move || ctx.sweep()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!("Sweep skipped: {}", e),
                    Err(e) => warn!("Sweep task failed: {}", e),
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    debug!("Sweep loop received shutdown signal");
                    break;
                }
            }
        }
    }
}

async fn event_loop(
    ctx: Arc<SweepContext>,
    mut subscription: ProcessSubscription,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            event = subscription.next() => {
                match event {
                    Some(event) => {
                        ctx.enforce(event.process());
                    }
                    None => {
                        debug!("Process event source closed");
                        break;
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
    subscription.unsubscribe();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apps::events::ProcessEvent;
    use crate::notify::{Notifier, NotifyRateLimiter};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    /// In-memory process table. Processes listed in `stubborn` ignore SIGTERM.
    #[derive(Default)]
    struct FakeProcesses {
        table: Mutex<Vec<RunningProcess>>,
        stubborn: Mutex<HashSet<u32>>,
        terminated: Mutex<Vec<u32>>,
        forced: Mutex<Vec<u32>>,
    }

    impl FakeProcesses {
        fn with(entries: &[(u32, &str)]) -> Arc<Self> {
            let fake = Self::default();
            *fake.table.lock().unwrap() = entries
                .iter()
                .map(|(pid, name)| RunningProcess::new(*pid, *name))
                .collect();
            Arc::new(fake)
        }

        fn stubborn(&self, pid: u32) {
            self.stubborn.lock().unwrap().insert(pid);
        }

        fn remove(&self, pid: u32) {
            self.table.lock().unwrap().retain(|p| p.pid != pid);
        }
    }

    impl ProcessControl for FakeProcesses {
        fn snapshot(&self) -> Result<Vec<RunningProcess>, ProcessError> {
            Ok(self.table.lock().unwrap().clone())
        }

        fn terminate(&self, pid: u32) -> Result<(), ProcessError> {
            self.terminated.lock().unwrap().push(pid);
            if !self.stubborn.lock().unwrap().contains(&pid) {
                self.remove(pid);
            }
            Ok(())
        }

        fn force_terminate(&self, pid: u32) -> Result<(), ProcessError> {
            self.forced.lock().unwrap().push(pid);
            self.remove(pid);
            Ok(())
        }

        fn is_running(&self, pid: u32) -> bool {
            self.table.lock().unwrap().iter().any(|p| p.pid == pid)
        }
    }

    /// Event source fed by the test through an mpsc sender.
    struct ManualEvents {
        tx: Mutex<Option<mpsc::Sender<ProcessEvent>>>,
    }

    impl ManualEvents {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                tx: Mutex::new(None),
            })
        }

        fn sender(&self) -> mpsc::Sender<ProcessEvent> {
            self.tx.lock().unwrap().clone().unwrap()
        }
    }

    impl ProcessEventSource for ManualEvents {
        fn subscribe(&self) -> ProcessSubscription {
            let (tx, subscription) = ProcessSubscription::channel();
            *self.tx.lock().unwrap() = Some(tx);
            subscription
        }
    }

    #[derive(Default)]
    struct CountingNotifier {
        count: AtomicUsize,
    }

    impl Notifier for CountingNotifier {
        fn notify(&self, _title: &str, _body: &str) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn reminder(notifier: Arc<CountingNotifier>) -> FocusReminder {
        let limiter = Arc::new(NotifyRateLimiter::new(Duration::from_secs(10)));
        FocusReminder::new(limiter, notifier, "Deep Work")
    }

    fn fast_config() -> EnforcerConfig {
        EnforcerConfig {
            sweep_interval: Duration::from_millis(400),
            grace: Duration::from_millis(20),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_initial_sweep_terminates_blocked_apps() {
        let procs = FakeProcesses::with(&[(10, "Slack"), (11, "Mail"), (12, "Discord")]);
        let events = ManualEvents::new();
        let mut enforcer = AppSweepEnforcer::new(procs.clone(), events, fast_config());

        let blocklist = Arc::new(BlockList::new(["Slack", "Discord"], Vec::<String>::new()));
        let started = enforcer.start(blocklist, reminder(Arc::default())).unwrap();

        assert_eq!(started, 2);
        let mut terminated = procs.terminated.lock().unwrap().clone();
        terminated.sort();
        assert_eq!(terminated, vec![10, 12]);
        enforcer.stop();
    }

    #[tokio::test]
    async fn test_allowlisted_app_is_never_terminated() {
        let procs = FakeProcesses::with(&[(20, "Finder"), (21, "Slack")]);
        let mut enforcer = AppSweepEnforcer::new(procs.clone(), ManualEvents::new(), fast_config());

        let blocklist = Arc::new(BlockList::new(["Finder", "Slack"], Vec::<String>::new()));
        enforcer.start(blocklist, reminder(Arc::default())).unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(*procs.terminated.lock().unwrap(), vec![21]);
        assert!(procs.is_running(20));
        enforcer.stop();
    }

    #[tokio::test]
    async fn test_survivor_is_force_terminated_with_single_reminder() {
        let procs = FakeProcesses::with(&[(30, "Slack"), (31, "Discord")]);
        procs.stubborn(30);
        procs.stubborn(31);

        let notifier = Arc::new(CountingNotifier::default());
        let terminations = Arc::new(Mutex::new(Vec::new()));
        let sink = terminations.clone();

        let mut enforcer = AppSweepEnforcer::new(procs.clone(), ManualEvents::new(), fast_config())
            .on_terminated(Arc::new(move |t: &Termination| {
                sink.lock().unwrap().push(t.clone());
            }));

        let blocklist = Arc::new(BlockList::new(["Slack", "Discord"], Vec::<String>::new()));
        enforcer.start(blocklist, reminder(notifier.clone())).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut forced = procs.forced.lock().unwrap().clone();
        forced.sort();
        assert_eq!(forced, vec![30, 31]);
        assert_eq!(notifier.count.load(Ordering::SeqCst), 1);
        assert!(terminations.lock().unwrap().iter().all(|t| t.forced));
        enforcer.stop();
    }

    #[tokio::test]
    async fn test_graceful_exit_needs_no_escalation() {
        let procs = FakeProcesses::with(&[(40, "Slack")]);
        let notifier = Arc::new(CountingNotifier::default());
        let mut enforcer = AppSweepEnforcer::new(procs.clone(), ManualEvents::new(), fast_config());

        let blocklist = Arc::new(BlockList::new(["Slack"], Vec::<String>::new()));
        enforcer.start(blocklist, reminder(notifier.clone())).unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(procs.forced.lock().unwrap().is_empty());
        assert_eq!(notifier.count.load(Ordering::SeqCst), 0);
        enforcer.stop();
    }

    #[tokio::test]
    async fn test_launch_event_is_enforced() {
        let procs = FakeProcesses::with(&[]);
        let events = ManualEvents::new();
        let mut enforcer = AppSweepEnforcer::new(procs.clone(), events.clone(), fast_config());

        let blocklist = Arc::new(BlockList::new(["Discord"], Vec::<String>::new()));
        enforcer.start(blocklist, reminder(Arc::default())).unwrap();

        procs
            .table
            .lock()
            .unwrap()
            .push(RunningProcess::new(50, "Discord"));
        events
            .sender()
            .send(ProcessEvent::Launched(RunningProcess::new(50, "Discord")))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(*procs.terminated.lock().unwrap(), vec![50]);
        enforcer.stop();
    }

    #[tokio::test]
    async fn test_periodic_sweep_catches_missed_launch() {
        let procs = FakeProcesses::with(&[]);
        let mut enforcer = AppSweepEnforcer::new(procs.clone(), ManualEvents::new(), fast_config());

        let blocklist = Arc::new(BlockList::new(["Discord"], Vec::<String>::new()));
        enforcer.start(blocklist, reminder(Arc::default())).unwrap();

        procs
            .table
            .lock()
            .unwrap()
            .push(RunningProcess::new(60, "Discord"));
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(*procs.terminated.lock().unwrap(), vec![60]);
        enforcer.stop();
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_halts_sweeps() {
        let procs = FakeProcesses::with(&[]);
        let mut enforcer = AppSweepEnforcer::new(procs.clone(), ManualEvents::new(), fast_config());

        enforcer.stop();
        enforcer
            .start(
                Arc::new(BlockList::new(["Discord"], Vec::<String>::new())),
                reminder(Arc::default()),
            )
            .unwrap();
        assert!(enforcer.is_running());

        enforcer.stop();
        enforcer.stop();
        assert!(!enforcer.is_running());

        procs
            .table
            .lock()
            .unwrap()
            .push(RunningProcess::new(70, "Discord"));
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(procs.terminated.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blocked_bundle_id_is_terminated() {
        let procs = FakeProcesses::with(&[]);
        procs.table.lock().unwrap().extend([
            RunningProcess::new(90, "Slack").with_bundle_id("com.tinyspeck.slackmacgap"),
            RunningProcess::new(91, "Mail").with_bundle_id("com.apple.mail"),
        ]);
        let mut enforcer = AppSweepEnforcer::new(procs.clone(), ManualEvents::new(), fast_config());

        let blocklist = Arc::new(BlockList::new(
            ["com.tinyspeck.slackmacgap"],
            Vec::<String>::new(),
        ));
        let started = enforcer.start(blocklist, reminder(Arc::default())).unwrap();

        assert_eq!(started, 1);
        assert_eq!(*procs.terminated.lock().unwrap(), vec![90]);
        enforcer.stop();
    }

    #[tokio::test]
    async fn test_allowlisted_bundle_id_wins_over_blocked_name() {
        let procs = FakeProcesses::with(&[]);
        procs
            .table
            .lock()
            .unwrap()
            .push(RunningProcess::new(92, "Finder").with_bundle_id("com.apple.finder"));
        let config = EnforcerConfig {
            allowlist: ["com.apple.finder".to_string()].into_iter().collect(),
            ..fast_config()
        };
        let mut enforcer = AppSweepEnforcer::new(procs.clone(), ManualEvents::new(), config);

        let blocklist = Arc::new(BlockList::new(["Finder"], Vec::<String>::new()));
        assert_eq!(enforcer.start(blocklist, reminder(Arc::default())).unwrap(), 0);
        assert!(procs.terminated.lock().unwrap().is_empty());
        enforcer.stop();
    }

    #[tokio::test]
    async fn test_activation_is_enforced_before_next_sweep() {
        let procs = FakeProcesses::with(&[]);
        let events = ManualEvents::new();
        let config = EnforcerConfig {
            sweep_interval: Duration::from_secs(30),
            ..fast_config()
        };
        let mut enforcer = AppSweepEnforcer::new(procs.clone(), events.clone(), config);

        let blocklist = Arc::new(BlockList::new(["com.hnc.Discord"], Vec::<String>::new()));
        enforcer.start(blocklist, reminder(Arc::default())).unwrap();

        let discord = RunningProcess::new(93, "Discord").with_bundle_id("com.hnc.Discord");
        procs.table.lock().unwrap().push(discord.clone());
        events
            .sender()
            .send(ProcessEvent::Activated(discord))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(*procs.terminated.lock().unwrap(), vec![93]);
        enforcer.stop();
    }

    /// Inventory that is unreadable until `recover` is called.
    struct FlakyInventory {
        inner: Arc<FakeProcesses>,
        broken: AtomicBool,
    }

    impl ProcessControl for FlakyInventory {
        fn snapshot(&self) -> Result<Vec<RunningProcess>, ProcessError> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(ProcessError::Inventory("table unavailable".to_string()));
            }
            self.inner.snapshot()
        }
        fn terminate(&self, pid: u32) -> Result<(), ProcessError> {
            self.inner.terminate(pid)
        }
        fn force_terminate(&self, pid: u32) -> Result<(), ProcessError> {
            self.inner.force_terminate(pid)
        }
        fn is_running(&self, pid: u32) -> bool {
            self.inner.is_running(pid)
        }
    }

    #[tokio::test]
    async fn test_failed_initial_sweep_is_reported_and_retried() {
        let procs = FakeProcesses::with(&[(95, "Slack")]);
        let flaky = Arc::new(FlakyInventory {
            inner: procs.clone(),
            broken: AtomicBool::new(true),
        });
        let mut enforcer = AppSweepEnforcer::new(flaky.clone(), ManualEvents::new(), fast_config());

        let blocklist = Arc::new(BlockList::new(["Slack"], Vec::<String>::new()));
        let result = enforcer.start(blocklist, reminder(Arc::default()));
        assert!(matches!(result, Err(ProcessError::Inventory(_))));
        assert!(enforcer.is_running());

        flaky.broken.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(*procs.terminated.lock().unwrap(), vec![95]);
        enforcer.stop();
    }

    #[test]
    fn test_config_merges_builtin_allowlist() {
        let apps = AppsConfig {
            allowlist: vec!["Music".to_string()],
            ..Default::default()
        };
        let config = EnforcerConfig::from_config(&apps);

        assert!(config.allowlist.contains("Music"));
        assert!(config.allowlist.contains("Finder"));
        assert!(config.allowlist.contains("com.apple.Terminal"));
        assert!(config.allowlist.contains("focus-warden"));
    }
}
