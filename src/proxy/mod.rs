//! Local intercepting proxy for blocked sites.
//!
//! This module provides a loopback HTTP proxy with:
//! - HTTP CONNECT admission for HTTPS (payload is never decrypted)
//! - Plain HTTP requests answered with a literal `403 Forbidden`
//! - Bounded request-head parsing that rejects malformed or oversized input
//! - Optional relaying of unblocked traffic
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐  PAC: blocked host  ┌──────────────────┐
//! │   Browser   │────────────────────►│ InterceptingProxy│──► close / 403
//! └─────┬───────┘                     │  127.0.0.1:8899  │
//!       │ PAC: everything else        └──────────────────┘
//!       ▼
//! ┌─────────────┐
//! │  Internet   │
//! └─────────────┘
//! ```

pub mod connect;
pub mod error;
pub mod server;

pub use connect::{
    BlockedHit, CONNECTION_ESTABLISHED, ConnectionOutcome, ConnectionPolicy, FORBIDDEN_RESPONSE,
    HitHook, HostPredicate, RequestLimits, RequestLine, handle_connection, parse_headers,
    parse_request_line, request_authority,
};
pub use error::ProxyError;
pub use server::{InterceptingProxy, ProxyConfig};
