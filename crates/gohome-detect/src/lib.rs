//! # gohome detect
//!
//! Camera sampling and detection dispatch on top of the `gohome-schedule`
//! worker.
//!
//! The [`Detector`] owns a [`FrameSource`] and registers a sampling job on a
//! shared [`Worker`](gohome_schedule::Worker). Each run reads up to
//! `frame_count` frames, hands them to a [`DetectionCapability`] and writes
//! the first positive frame through an [`ImageSink`]. [`Detector::preview`]
//! drives the same capability from an interactive loop instead.
//!
//! Hardware and models stay behind the capability traits. The crate ships
//! file-backed adapters ([`SnapshotSource`], [`FileImageSink`]) and a
//! frame-differencing [`MotionDetector`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gohome_detect::{Detector, DetectorConfig, FileImageSink, MotionDetector, SnapshotSource};
//! use gohome_schedule::{Worker, WorkerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let worker = Arc::new(Worker::new(WorkerConfig::default())?);
//!     let config = DetectorConfig::new(Arc::new(MotionDetector::default()), Arc::new(FileImageSink))
//!         .with_camera(Box::new(SnapshotSource::new("/tmp/camera.jpg")))
//!         .with_save_path("./logs/detected");
//!     let detector = Detector::new(config, worker)?;
//!     detector.start_schedule().await?;
//!     Ok(())
//! }
//! ```

pub mod annotate;
pub mod capability;
pub mod detector;
pub mod error;
pub mod frame;
pub mod motion;
pub mod sink;
pub mod source;

pub use annotate::{ANNOTATION_COLOR, ANNOTATION_THICKNESS, detect_and_annotate, draw_rectangle};
pub use capability::{DetectionCapability, FrameSource, ImageSink, PreviewSink, QUIT_KEY};
pub use detector::{DETECTOR_JOB_NAME, DETECTOR_JOB_TAG, Detector, DetectorConfig, image_file_name};
pub use error::{DetectError, DetectResult, SourceError};
pub use frame::{Detection, Frame, Region};
pub use motion::{MAX_GRID, MotionDetector};
pub use sink::FileImageSink;
pub use source::{SnapshotSource, load_frame};
