//! Error types for the scheduling worker.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur while registering or running jobs.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Interval trigger with a zero duration.
    #[error("Invalid interval {0:?}: must be greater than zero")]
    InvalidInterval(Duration),

    /// Cron trigger that does not parse.
    #[error("Invalid cron expression '{expr}': {message}")]
    InvalidCron { expr: String, message: String },

    /// Worker configuration rejected at construction.
    #[error("Invalid worker configuration: {0}")]
    InvalidConfig(String),

    /// No job registered with this id.
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    /// A scheduling loop is already active on this worker.
    #[error("Worker is already running")]
    AlreadyRunning,

    /// The scheduling engine has not been started.
    #[error("Scheduler engine is not running")]
    NotRunning,

    /// In-flight jobs did not finish before the shutdown deadline.
    #[error("Scheduler shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),
}

/// Result type for scheduling operations.
pub type ScheduleResult<T> = Result<T, ScheduleError>;
