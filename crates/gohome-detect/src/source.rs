//! Still-image frame source.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::capability::FrameSource;
use crate::error::SourceError;
use crate::frame::Frame;

/// Decode an image file into a frame.
pub fn load_frame(path: &Path) -> Result<Frame, SourceError> {
    let bytes = std::fs::read(path)?;
    let image = image::load_from_memory(&bytes)?;
    Ok(Frame::from_dynamic(image))
}

/// Reads the latest snapshot a capture tool keeps overwriting at one path.
///
/// A missing file is a failed read. A file that is mid-write (partial or
/// undecodable) yields an empty frame.
#[derive(Debug)]
pub struct SnapshotSource {
    path: PathBuf,
    open: bool,
}

impl SnapshotSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            open: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSource for SnapshotSource {
    fn read(&mut self, frame: &mut Frame) -> bool {
        if !self.open {
            return false;
        }

        match load_frame(&self.path) {
            Ok(next) => {
                *frame = next;
                true
            }
            Err(SourceError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                warn!("Snapshot not found: {}", self.path.display());
                false
            }
            Err(SourceError::Io(e)) => {
                warn!("Failed to read snapshot {}: {}", self.path.display(), e);
                false
            }
            Err(e) => {
                debug!("Snapshot not decodable yet: {}", e);
                *frame = Frame::empty();
                true
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) -> Result<(), SourceError> {
        self.open = false;
        Ok(())
    }
}
