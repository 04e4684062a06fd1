//! Image file sink.

use std::path::Path;

use image::ImageFormat;
use tracing::warn;

use crate::capability::ImageSink;
use crate::frame::Frame;

/// Writes frames with the `image` crate, picking the format from the file
/// extension. Missing parent directories are created.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileImageSink;

impl FileImageSink {
    fn save(path: &Path, frame: &Frame) -> Result<(), String> {
        if frame.is_empty() {
            return Err("frame is empty".to_string());
        }
        let format = ImageFormat::from_path(path).map_err(|e| e.to_string())?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        frame
            .image()
            .save_with_format(path, format)
            .map_err(|e| e.to_string())
    }
}

impl ImageSink for FileImageSink {
    fn write(&self, path: &Path, frame: &Frame) -> bool {
        match Self::save(path, frame) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to encode {}: {}", path.display(), e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use tempfile::TempDir;

    #[test]
    fn test_writes_jpeg_into_new_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("detected").join("20240101000000_0.jpg");
        let frame = Frame::new(RgbImage::new(8, 8));

        assert!(FileImageSink.write(&path, &frame));
        let decoded = image::open(&path).unwrap();
        assert_eq!(decoded.width(), 8);
    }

    #[test]
    fn test_rejects_empty_frame() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.jpg");
        assert!(!FileImageSink.write(&path, &Frame::empty()));
        assert!(!path.exists());
    }

    #[test]
    fn test_rejects_unknown_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frame.unknown");
        assert!(!FileImageSink.write(&path, &Frame::new(RgbImage::new(2, 2))));
    }
}
