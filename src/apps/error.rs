//! Error types for process enforcement.

use thiserror::Error;

/// Errors from the process control layer.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Process inventory could not be read.
    #[error("Failed to list running processes: {0}")]
    Inventory(String),

    /// The process is gone (already exited or never existed).
    #[error("Process {pid} not found")]
    NotFound {
        /// Process ID.
        pid: u32,
    },

    /// The OS refused to deliver the signal (usually missing permission).
    #[error("Failed to signal process {pid}: {message}")]
    Signal {
        /// Process ID.
        pid: u32,
        /// Error description.
        message: String,
    },
}
