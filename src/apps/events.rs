//! Process launch and activation notifications.
//!
//! The enforcer subscribes to a [`ProcessEventSource`] and gets back a
//! [`ProcessSubscription`] handle. Dropping the handle (or calling
//! [`ProcessSubscription::unsubscribe`]) stops delivery, so no observer
//! outlives the session that registered it.
//!
//! The portable source polls the process table on a short interval and
//! reports PIDs that were not present on the previous pass. Given a
//! [`ForegroundApp`] it also reports the process that came to the
//! front whenever the frontmost application changes.
//!
//! # Example
//!
//! ```ignore
//! use focus_warden::apps::{PollingEventSource, ProcessEventSource, SysinfoProcessControl};
//! use focus_warden::browser::platform_foreground;
//! use std::sync::Arc;
//!
//! let source = PollingEventSource::new(Arc::new(SysinfoProcessControl::new()))
//!     .with_foreground(platform_foreground(Duration::from_millis(1500)));
//! let mut subscription = source.subscribe();
//! while let Some(event) = subscription.next().await {
//!     println!("{:?}", event);
//! }
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use super::process::{ProcessControl, RunningProcess};
use crate::browser::ForegroundApp;

/// Default interval for the polling event source.
pub const DEFAULT_EVENT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Default interval between frontmost-application checks.
pub const DEFAULT_ACTIVATION_POLL_INTERVAL: Duration = Duration::from_millis(400);

/// Buffer size for subscription channels.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A process lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// A process appeared.
    Launched(RunningProcess),
    /// A process became the active (foreground) application.
    Activated(RunningProcess),
}

impl ProcessEvent {
    /// The process the event refers to.
    pub fn process(&self) -> &RunningProcess {
        match self {
            ProcessEvent::Launched(p) | ProcessEvent::Activated(p) => p,
        }
    }
}

/// Capability to observe process launches and activations.
pub trait ProcessEventSource: Send + Sync {
    /// Start delivering events. Must be called inside a Tokio runtime.
    fn subscribe(&self) -> ProcessSubscription;
}

/// Live subscription to a [`ProcessEventSource`].
pub struct ProcessSubscription {
    rx: mpsc::Receiver<ProcessEvent>,
    task: Option<JoinHandle<()>>,
}

impl ProcessSubscription {
    /// Wrap a receiver and the task feeding it.
    pub fn new(rx: mpsc::Receiver<ProcessEvent>, task: Option<JoinHandle<()>>) -> Self {
        Self { rx, task }
    }

    /// Build a subscription plus the sender used to feed it.
    pub fn channel() -> (mpsc::Sender<ProcessEvent>, Self) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        (tx, Self::new(rx, None))
    }

    /// Next event, or `None` once the source has stopped.
    pub async fn next(&mut self) -> Option<ProcessEvent> {
        self.rx.recv().await
    }

    /// Stop delivery and release the producer.
    pub fn unsubscribe(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.rx.close();
    }
}

impl Drop for ProcessSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Diffs successive inventories to find newly launched processes.
#[derive(Debug, Default)]
pub struct LaunchDetector {
    known: HashSet<u32>,
    primed: bool,
}

impl LaunchDetector {
    /// Create a detector with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one inventory and return the processes that were not seen before.
    ///
    /// The first call only records the baseline and reports nothing; the
    /// enforcer's initial sweep already covers processes running at start.
    pub fn poll_once(&mut self, current: &[RunningProcess]) -> Vec<ProcessEvent> {
        let current_pids: HashSet<u32> = current.iter().map(|p| p.pid).collect();

        let events = if self.primed {
            current
                .iter()
                .filter(|p| !self.known.contains(&p.pid))
                .inspect(|p| trace!("Launch detected: {} (pid {})", p.app_id, p.pid))
                .cloned()
                .map(ProcessEvent::Launched)
                .collect()
        } else {
            Vec::new()
        };

        self.known = current_pids;
        self.primed = true;
        events
    }
}

/// Turns successive frontmost-application readings into activations.
#[derive(Debug, Default)]
pub struct ActivationDetector {
    frontmost: Option<String>,
    primed: bool,
}

impl ActivationDetector {
    /// Create a detector with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one reading of the frontmost bundle identifier.
    ///
    /// When it differs from the previous reading, every process in
    /// `inventory` that answers to the new identifier is reported. The first
    /// reading only records the baseline.
    pub fn observe(
        &mut self,
        frontmost: Option<String>,
        inventory: &[RunningProcess],
    ) -> Vec<ProcessEvent> {
        let changed = self.primed && frontmost != self.frontmost;
        self.frontmost = frontmost;
        self.primed = true;

        let Some(front) = self.frontmost.as_deref().filter(|_| changed) else {
            return Vec::new();
        };
        trace!("Frontmost application changed to {}", front);

        inventory
            .iter()
            .filter(|p| p.answers_to(front))
            .cloned()
            .map(ProcessEvent::Activated)
            .collect()
    }
}

/// [`ProcessEventSource`] that polls a [`ProcessControl`] inventory.
pub struct PollingEventSource {
    control: Arc<dyn ProcessControl>,
    interval: Duration,
    foreground: Option<Arc<dyn ForegroundApp>>,
    activation_interval: Duration,
}

impl PollingEventSource {
    /// Create a source polling at [`DEFAULT_EVENT_POLL_INTERVAL`].
    pub fn new(control: Arc<dyn ProcessControl>) -> Self {
        Self::with_interval(control, DEFAULT_EVENT_POLL_INTERVAL)
    }

    /// Create a source with a custom poll interval.
    pub fn with_interval(control: Arc<dyn ProcessControl>, interval: Duration) -> Self {
        Self {
            control,
            interval,
            foreground: None,
            activation_interval: DEFAULT_ACTIVATION_POLL_INTERVAL,
        }
    }

    /// Also report activations seen through `foreground`.
    ///
    /// A source that can never answer is ignored.
    pub fn with_foreground(mut self, foreground: Arc<dyn ForegroundApp>) -> Self {
        self.foreground = foreground.is_available().then_some(foreground);
        self
    }

    /// Interval between frontmost-application checks.
    pub fn with_activation_interval(mut self, interval: Duration) -> Self {
        self.activation_interval = interval;
        self
    }
}

async fn inventory(control: &Arc<dyn ProcessControl>) -> Option<Vec<RunningProcess>> {
    let control = control.clone();
    match tokio::task::spawn_blocking(move || control.snapshot()).await {
        Ok(Ok(processes)) => Some(processes),
        Ok(Err(e)) => {
            trace!("Process inventory failed: {}", e);
            None
        }
        Err(e) => {
            trace!("Process inventory task failed: {}", e);
            None
        }
    }
}

impl ProcessEventSource for PollingEventSource {
    fn subscribe(&self) -> ProcessSubscription {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let control = self.control.clone();
        let foreground = self.foreground.clone();
        let period = self.interval;
        let activation_period = self.activation_interval;

        let task = tokio::spawn(async move {
            let mut launches = LaunchDetector::new();
            let mut activations = ActivationDetector::new();
            let mut latest: Vec<RunningProcess> = Vec::new();

            let mut launch_tick = tokio::time::interval(period);
            launch_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut activation_tick = tokio::time::interval(activation_period);
            activation_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                let events = tokio::select! {
                    _ = launch_tick.tick() => match inventory(&control).await {
                        Some(processes) => {
                            let events = launches.poll_once(&processes);
                            latest = processes;
                            events
                        }
                        None => Vec::new(),
                    },
                    _ = activation_tick.tick(), if foreground.is_some() => {
                        let frontmost = match &foreground {
                            Some(front) => front.frontmost_bundle_id().await,
                            None => None,
                        };
                        activations.observe(frontmost, &latest)
                    }
                };

                for event in events {
                    if tx.send(event).await.is_err() {
                        debug!("Process event receiver dropped, stopping poller");
                        return;
                    }
                }
            }
        });

        ProcessSubscription::new(rx, Some(task))
    }
}
