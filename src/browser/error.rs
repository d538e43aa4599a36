//! Browser automation error types.

use std::time::Duration;

use thiserror::Error;

/// Errors from a single scripting bridge call.
///
/// All of these are transient for the tab watcher: the tick is skipped and
/// polling continues.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The script interpreter could not be started.
    #[error("Failed to run script interpreter: {0}")]
    Spawn(#[source] std::io::Error),

    /// The script did not finish in time.
    #[error("Script timed out after {0:?}")]
    Timeout(Duration),

    /// The script ran and reported an error (permission denied, app gone).
    #[error("Script failed: {0}")]
    ScriptFailed(String),

    /// The application is not a browser we know how to script.
    #[error("Unsupported browser: {0}")]
    Unsupported(String),
}
