//! Error types for detection.

use gohome_schedule::ScheduleError;
use thiserror::Error;

/// Errors raised by the detector.
#[derive(Debug, Error)]
pub enum DetectError {
    /// No camera was supplied.
    #[error("camera is nil")]
    CameraMissing,

    /// Configuration rejected at construction.
    #[error("Invalid detector config: {0}")]
    InvalidConfig(String),

    /// The frame source failed to produce a frame.
    #[error("cannot read device")]
    ReadFailed,

    /// Camera error.
    #[error("Camera error: {0}")]
    Source(#[from] SourceError),

    /// Job registration or worker error.
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

/// Errors raised by frame sources.
#[derive(Debug, Error)]
pub enum SourceError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Image could not be decoded.
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    /// Device refused to release.
    #[error("Failed to close source: {0}")]
    Close(String),
}

/// Result type for detector operations.
pub type DetectResult<T> = Result<T, DetectError>;
