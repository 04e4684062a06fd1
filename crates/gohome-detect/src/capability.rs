//! Seams to hardware, models and displays.

use std::path::Path;

use crate::error::SourceError;
use crate::frame::{Frame, Region};

/// Key code that ends the preview loop (`q`).
pub const QUIT_KEY: i32 = 113;

/// Finds regions of interest in a frame.
pub trait DetectionCapability: Send + Sync {
    fn detect(&self, frame: &Frame) -> Vec<Region>;
}

/// Encodes a frame to disk.
pub trait ImageSink: Send + Sync {
    /// Write `frame` to `path`. Returns false on failure.
    fn write(&self, path: &Path, frame: &Frame) -> bool;
}

/// Produces frames from a camera or similar device.
pub trait FrameSource: Send {
    /// Overwrite `frame` with the next frame.
    ///
    /// Returns false if the device could not be read. A successful read may
    /// still leave `frame` empty.
    fn read(&mut self, frame: &mut Frame) -> bool;

    fn is_open(&self) -> bool;

    fn close(&mut self) -> Result<(), SourceError>;
}

/// Interactive display for the preview loop.
pub trait PreviewSink {
    fn show(&mut self, frame: &Frame);

    /// Wait up to `timeout_ms` for a key press. Returns the key code or -1.
    fn wait_key(&mut self, timeout_ms: u32) -> i32;
}
