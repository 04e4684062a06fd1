//! Daemon-related errors.

use thiserror::Error;

/// Errors that can occur while running or stopping the process.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Failed to set up signal handlers.
    #[error("Failed to set up signal handlers: {0}")]
    SignalSetup(String),

    /// A shutdown step failed.
    #[error("Shutdown step '{step}' failed: {message}")]
    ShutdownStep { step: String, message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
