//! Blocked application enforcement.
//!
//! - [`process`]: process inventory and termination behind [`ProcessControl`]
//! - [`events`]: launch/activation notifications behind [`ProcessEventSource`]
//! - [`enforcer`]: the sweep loop that ties them to a [`BlockList`](crate::blocklist::BlockList)

pub mod enforcer;
pub mod error;
pub mod events;
pub mod process;

pub use enforcer::{AppSweepEnforcer, BUILTIN_ALLOWLIST, EnforcerConfig, Termination, TerminationHook};
pub use error::ProcessError;
pub use events::{
    ActivationDetector, LaunchDetector, PollingEventSource, ProcessEvent, ProcessEventSource,
    ProcessSubscription,
};
pub use process::{ProcessControl, RunningProcess, SysinfoProcessControl, bundle_id_for_exe};
