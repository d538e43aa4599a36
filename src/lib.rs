//! focus-warden: focus mode enforcement
//!
//! While a focus session is active this crate keeps a chosen set of
//! applications closed and a chosen set of websites unreachable, then
//! restores the machine exactly as it was when the session ends.
//!
//! # Architecture
//!
//! - **Apps**: sweep loop plus launch events that terminate blocked applications
//! - **Proxy**: loopback HTTP proxy that refuses blocked hosts
//! - **Steering**: PAC file and system auto-proxy settings that route blocked
//!   hosts to the proxy
//! - **Browser**: scripting-bridge watcher that blanks or closes blocked tabs
//! - **Orchestrator**: one session lifecycle over all of the above
//! - **Config**: hierarchical TOML configuration with named focus modes
//! - **Telemetry**: structured syslog logging for an audit trail

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod apps;
pub mod blocklist;
pub mod browser;
pub mod cli;
pub mod cli_handler;
pub mod config;
pub mod notify;
pub mod orchestrator;
pub mod proxy;
pub mod steering;
pub mod telemetry;
