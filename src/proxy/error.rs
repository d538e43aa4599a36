//! Error types for proxy operations.
//!
//! - Server errors (binding the listener)
//! - Request errors (malformed or oversized request heads, slow clients)
//! - Connection errors (upstream connect, relaying)

use std::net::SocketAddr;

use thiserror::Error;

/// Unified error type for proxy operations.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// I/O error (socket operations).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The listen address could not be bound (usually already in use).
    #[error("Failed to bind proxy listener on {addr}: {source}")]
    Bind {
        /// Address we tried to bind.
        addr: SocketAddr,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Request line or header block could not be parsed.
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// No terminator arrived within the buffer bound.
    #[error("Request head exceeds {limit} bytes")]
    RequestTooLarge {
        /// The bound that was exceeded.
        limit: usize,
    },

    /// Client did not send its request head in time.
    #[error("Timed out waiting for client request")]
    Timeout,

    /// Failed to connect to upstream server.
    #[error("Failed to connect to upstream '{addr}': {message}")]
    UpstreamConnect {
        /// The address we tried to connect to.
        addr: String,
        /// Error message.
        message: String,
    },
}
