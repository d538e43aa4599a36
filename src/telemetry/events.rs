//! Audit event types for structured logging.
//!
//! These events are logged to syslog with the `FOCUS_WARDEN` tag so that a
//! session's enforcement history can be reviewed after the fact.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Audit events for enforcement logging.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Focus session started.
    SessionStart {
        /// Session display name (the mode name).
        session: String,
        /// Identifier of the mode the session was started from.
        mode_id: String,
        /// Number of blocked application identifiers.
        apps: usize,
        /// Number of blocked domains.
        domains: usize,
    },

    /// Focus session ended.
    SessionEnd {
        /// Session display name.
        session: String,
        /// Duration of the session in seconds.
        duration_sec: u64,
    },

    /// A blocked application was terminated.
    AppTerminated {
        /// Application identifier.
        app: String,
        /// Process ID.
        pid: u32,
        /// Whether escalation to forced termination was needed.
        forced: bool,
    },

    /// A blocked site was reached and stopped.
    SiteBlocked {
        /// Host that was blocked.
        host: String,
        /// Which enforcement layer caught it.
        via: HitSource,
    },

    /// An enforcement subsystem failed to start or stop.
    SubsystemFailed {
        /// Subsystem name.
        subsystem: String,
        /// Error description.
        message: String,
    },

    /// The prior auto-proxy configuration could not be restored exactly.
    ProxyRestoreFailed {
        /// Error description.
        message: String,
    },
}

/// Enforcement layer that observed a blocked site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HitSource {
    /// A `CONNECT` tunnel request reached the proxy.
    ProxyConnect,
    /// A plain HTTP request reached the proxy.
    ProxyHttp,
    /// The browser tab watcher saw the URL in the foreground tab.
    BrowserTab,
}

/// Wrapper for serializing events with timestamp.
#[derive(Debug, Clone, Serialize)]
pub struct TimestampedEvent<'a> {
    /// ISO8601 timestamp.
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,

    /// The actual event (flattened into this struct).
    #[serde(flatten)]
    pub event: &'a AuditEvent,
}

impl AuditEvent {
    /// Wrap this event with a timestamp for serialization.
    pub fn with_timestamp(&self) -> TimestampedEvent<'_> {
        TimestampedEvent {
            timestamp: Utc::now(),
            event: self,
        }
    }
}
