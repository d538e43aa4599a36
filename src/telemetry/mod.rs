//! Telemetry and audit logging for focus-warden.
//!
//! This module provides structured logging to syslog with the `FOCUS_WARDEN` tag.
//! Every enforcement action (terminated app, blocked site) is recorded.
//!
//! # Architecture
//!
//! - **Audit logging** (syslog): Enforcement events go to syslog as JSON
//! - **Debug logging** (tracing): Development logs go to stderr via `tracing`
//! - These are completely separate concerns
//!
//! # Event Format
//!
//! Events are logged as JSON with an ISO8601 timestamp:
//!
//! ```json
//! {"ts":"2026-01-07T14:32:01Z","event":"site_blocked","host":"youtube.com","via":"proxy_connect"}
//! ```

mod error;
mod events;
mod syslog;

pub use error::TelemetryError;
pub use events::{AuditEvent, HitSource};
pub use syslog::{AuditLogger, SYSLOG_TAG};
