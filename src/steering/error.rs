//! Traffic steering error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors while generating the PAC file or changing proxy settings.
#[derive(Debug, Error)]
pub enum SteeringError {
    /// The PAC file could not be written.
    #[error("Failed to write PAC file {path:?}: {source}")]
    PacWrite {
        /// Destination path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The settings tool is not installed.
    #[error("'{0}' not found in PATH")]
    ToolNotFound(String),

    /// Failed to execute a settings command.
    #[error("Failed to execute '{cmd}': {source}")]
    CommandFailed {
        /// The command that failed.
        cmd: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A settings command exited with an error.
    #[error("Command '{cmd}' failed: {stderr}")]
    CommandError {
        /// The command that failed.
        cmd: String,
        /// Standard error output.
        stderr: String,
    },

    /// A settings command printed something we could not interpret.
    #[error("Unexpected output from '{cmd}': {output}")]
    UnexpectedOutput {
        /// The command.
        cmd: String,
        /// Its output.
        output: String,
    },

    /// The prior configuration could not be restored exactly.
    ///
    /// Auto-proxy has been turned off when this is returned, unless the
    /// message says otherwise.
    #[error("Failed to restore proxy settings: {0}")]
    Restore(String),

    /// A blocking settings task panicked or was cancelled.
    #[error("Settings task failed: {0}")]
    Task(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_display() {
        let err = SteeringError::CommandError {
            cmd: "networksetup -setautoproxystate Wi-Fi on".to_string(),
            stderr: "** Error: The parameters were not valid.".to_string(),
        };
        assert!(err.to_string().contains("networksetup"));
        assert!(err.to_string().contains("not valid"));
    }

    #[test]
    fn test_restore_error_display() {
        let err = SteeringError::Restore("service vanished".to_string());
        assert!(err.to_string().contains("service vanished"));
    }
}
