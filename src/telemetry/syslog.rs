//! Syslog integration for audit logging.
//!
//! All audit events are logged to syslog with the `FOCUS_WARDEN` tag.

use std::sync::Mutex;

use syslog::{Facility, Formatter3164};
use tracing::{debug, error, warn};

use super::error::TelemetryError;
use super::events::AuditEvent;

/// Syslog tag for all audit events.
pub const SYSLOG_TAG: &str = "FOCUS_WARDEN";

/// Audit logger that writes structured JSON events to syslog.
///
/// Uses interior mutability (Mutex) so that every enforcement task can log
/// through a shared `Arc<AuditLogger>`.
pub struct AuditLogger {
    /// Syslog writer protected by a mutex for interior mutability.
    /// None indicates a null logger.
    writer: Option<Mutex<syslog::Logger<syslog::LoggerBackend, Formatter3164>>>,
}

impl AuditLogger {
    /// Create a new audit logger connected to syslog.
    ///
    /// Uses Unix socket connection to local syslog daemon.
    pub fn new() -> Result<Self, TelemetryError> {
        let formatter = Formatter3164 {
            facility: Facility::LOG_USER,
            hostname: None,
            process: SYSLOG_TAG.to_string(),
            pid: std::process::id(),
        };

        let writer = syslog::unix(formatter).map_err(|e| {
            TelemetryError::SyslogConnection(format!("Failed to connect to syslog: {}", e))
        })?;

        debug!("Connected to syslog with tag '{}'", SYSLOG_TAG);
        Ok(Self {
            writer: Some(Mutex::new(writer)),
        })
    }

    /// Connect to syslog, falling back to a null logger when unavailable.
    pub fn connect_or_null() -> Self {
        match Self::new() {
            Ok(logger) => logger,
            Err(e) => {
                warn!("Audit events will not be recorded: {}", e);
                Self::new_null()
            }
        }
    }

    /// Create a null audit logger that discards all events.
    ///
    /// Useful for testing when syslog is not available.
    pub fn new_null() -> Self {
        Self { writer: None }
    }

    /// Log an audit event to syslog.
    ///
    /// The event is serialized to JSON with an ISO8601 timestamp.
    /// If this is a null logger, the event is silently discarded.
    pub fn log(&self, event: AuditEvent) {
        let Some(ref writer) = self.writer else {
            return;
        };

        let timestamped = event.with_timestamp();

        match serde_json::to_string(&timestamped) {
            Ok(json) => {
                match writer.lock() {
                    Ok(mut writer) => {
                        if let Err(e) = writer.info(&json) {
                            error!("Failed to write to syslog: {}", e);
                        }
                    }
                    Err(e) => {
                        error!("Failed to acquire syslog writer lock: {}", e);
                    }
                }
                debug!("Logged audit event: {}", json);
            }
            Err(e) => {
                error!("Failed to serialize audit event: {}", e);
            }
        }
    }

    /// Check if this is a null logger.
    pub fn is_null(&self) -> bool {
        self.writer.is_none()
    }
}
