//! Detector: sampling job, preview loop and camera lifecycle.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use gohome_schedule::{Job, JobOptions, JobTrigger, LogSink, NoopLogSink, ScheduleResult, Worker};
use parking_lot::Mutex;

use crate::annotate::detect_and_annotate;
use crate::capability::{DetectionCapability, FrameSource, ImageSink, PreviewSink, QUIT_KEY};
use crate::error::{DetectError, DetectResult};
use crate::frame::Frame;

/// Name of the registered sampling job.
pub const DETECTOR_JOB_NAME: &str = "Detector";

/// Tag of the registered sampling job.
pub const DETECTOR_JOB_TAG: &str = "detector";

/// Build `<YYYYmmddHHMMSS>[_<iteration>].<ext>`.
pub fn image_file_name(at: NaiveDateTime, iteration: Option<u64>, ext: &str) -> String {
    let stamp = at.format("%Y%m%d%H%M%S");
    match iteration {
        Some(n) => format!("{}_{}.{}", stamp, n, ext),
        None => format!("{}.{}", stamp, ext),
    }
}

/// Detector configuration.
pub struct DetectorConfig {
    pub camera: Option<Box<dyn FrameSource>>,
    pub capability: Arc<dyn DetectionCapability>,
    pub sink: Arc<dyn ImageSink>,

    /// Directory for positive frames. `None` disables saving.
    pub save_path: Option<PathBuf>,

    /// Extension (and so encoding) of saved frames.
    pub image_ext: String,

    /// Interval of the sampling job.
    pub schedule_interval: Duration,

    /// Non-empty frames examined per sampling cycle; also the preview
    /// detection cadence.
    pub frame_count: u32,

    /// Pause after a frame that detected nothing.
    pub frame_delay: Duration,

    /// Consecutive empty frames tolerated before a cycle gives up.
    pub max_empty_frames: u32,

    /// Reporting sink.
    pub logger: Arc<dyn LogSink>,
}

impl DetectorConfig {
    pub fn new(capability: Arc<dyn DetectionCapability>, sink: Arc<dyn ImageSink>) -> Self {
        Self {
            camera: None,
            capability,
            sink,
            save_path: None,
            image_ext: "jpg".to_string(),
            schedule_interval: Duration::from_secs(1),
            frame_count: 60,
            frame_delay: Duration::from_millis(1),
            max_empty_frames: 1000,
            logger: Arc::new(NoopLogSink),
        }
    }

    pub fn with_camera(mut self, camera: Box<dyn FrameSource>) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn with_save_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.save_path = Some(path.into());
        self
    }

    pub fn with_image_ext(mut self, ext: impl Into<String>) -> Self {
        self.image_ext = ext.into();
        self
    }

    pub fn with_schedule_interval(mut self, interval: Duration) -> Self {
        self.schedule_interval = interval;
        self
    }

    pub fn with_frame_count(mut self, count: u32) -> Self {
        self.frame_count = count;
        self
    }

    pub fn with_frame_delay(mut self, delay: Duration) -> Self {
        self.frame_delay = delay;
        self
    }

    pub fn with_max_empty_frames(mut self, max: u32) -> Self {
        self.max_empty_frames = max;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn LogSink>) -> Self {
        self.logger = logger;
        self
    }
}

impl std::fmt::Debug for DetectorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorConfig")
            .field("camera", &self.camera.is_some())
            .field("save_path", &self.save_path)
            .field("image_ext", &self.image_ext)
            .field("schedule_interval", &self.schedule_interval)
            .field("frame_count", &self.frame_count)
            .field("frame_delay", &self.frame_delay)
            .field("max_empty_frames", &self.max_empty_frames)
            .finish_non_exhaustive()
    }
}

/// State shared between the detector handle, its job and preview dispatches.
struct Inner {
    camera: Mutex<Box<dyn FrameSource>>,
    frame: Mutex<Frame>,
    capability: Arc<dyn DetectionCapability>,
    sink: Arc<dyn ImageSink>,
    save_path: Option<PathBuf>,
    image_ext: String,
    frame_count: u32,
    frame_delay: Duration,
    max_empty_frames: u32,
    in_flight: AtomicBool,
    logger: Arc<dyn LogSink>,
}

impl Inner {
    fn sample_cycle(&self) -> DetectResult<()> {
        // Lock order: camera, then frame.
        let mut camera = self.camera.lock();
        let mut frame = self.frame.lock();
        let mut iteration: u64 = 0;
        let mut empty_run: u32 = 0;

        while iteration < u64::from(self.frame_count) {
            if !camera.read(&mut frame) {
                return Err(DetectError::ReadFailed);
            }
            if frame.is_empty() {
                empty_run += 1;
                if empty_run >= self.max_empty_frames {
                    self.logger.warn(format_args!(
                        "{} consecutive empty frames, ending cycle",
                        empty_run
                    ));
                    return Ok(());
                }
                continue;
            }
            empty_run = 0;

            let detection =
                detect_and_annotate(self.capability.as_ref(), &mut frame, self.logger.as_ref());
            if detection.is_positive() {
                self.save(&frame, iteration);
                return Ok(());
            }

            iteration += 1;
            if !self.frame_delay.is_zero() {
                std::thread::sleep(self.frame_delay);
            }
        }
        Ok(())
    }

    fn save(&self, frame: &Frame, iteration: u64) {
        let Some(dir) = &self.save_path else {
            return;
        };
        let name = dir.join(image_file_name(
            Local::now().naive_local(),
            Some(iteration),
            &self.image_ext,
        ));
        if self.sink.write(&name, frame) {
            self.logger
                .info(format_args!("Saved image: {}", name.display()));
        } else {
            self.logger
                .error(format_args!("Failed to save image: {}", name.display()));
        }
    }
}

/// Clears the in-flight flag when a dispatched detection finishes.
struct InFlight(Arc<Inner>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.store(false, Ordering::SeqCst);
    }
}

/// Drives a frame source through a detection capability.
pub struct Detector {
    inner: Arc<Inner>,
    worker: Arc<Worker>,
    job: Arc<Job>,
}

impl Detector {
    /// Create a detector and register its sampling job on `worker`.
    pub fn new(config: DetectorConfig, worker: Arc<Worker>) -> DetectResult<Self> {
        let camera = config.camera.ok_or(DetectError::CameraMissing)?;
        if config.frame_count == 0 {
            return Err(DetectError::InvalidConfig(
                "frame_count must be greater than 0".to_string(),
            ));
        }
        if config.max_empty_frames == 0 {
            return Err(DetectError::InvalidConfig(
                "max_empty_frames must be greater than 0".to_string(),
            ));
        }

        let camera_open = camera.is_open();
        let inner = Arc::new(Inner {
            camera: Mutex::new(camera),
            frame: Mutex::new(Frame::empty()),
            capability: config.capability,
            sink: config.sink,
            save_path: config.save_path,
            image_ext: config.image_ext,
            frame_count: config.frame_count,
            frame_delay: config.frame_delay,
            max_empty_frames: config.max_empty_frames,
            in_flight: AtomicBool::new(false),
            logger: config.logger,
        });

        let task = inner.clone();
        let job = worker.new_job(
            JobTrigger::Interval(config.schedule_interval),
            move || task.sample_cycle().map_err(anyhow::Error::from),
            JobOptions::new()
                .with_name(DETECTOR_JOB_NAME)
                .with_tag(DETECTOR_JOB_TAG),
        )?;

        let logger = &inner.logger;
        logger.info(format_args!("camera is {}", camera_open));
        match &inner.save_path {
            Some(path) => logger.info(format_args!("saveImagePath: {}", path.display())),
            None => logger.info(format_args!("saveImagePath: (disabled)")),
        }
        logger.info(format_args!(
            "scheduled job: ID={}, Name={}",
            job.id(),
            job.name()
        ));

        Ok(Self { inner, worker, job })
    }

    /// The registered sampling job.
    pub fn job(&self) -> &Arc<Job> {
        &self.job
    }

    pub fn worker(&self) -> &Arc<Worker> {
        &self.worker
    }

    pub fn save_path(&self) -> Option<&Path> {
        self.inner.save_path.as_deref()
    }

    /// Run one sampling cycle on the calling thread.
    ///
    /// Reads up to `frame_count` non-empty frames and stops at the first
    /// positive detection, saving it when a save path is set. Empty frames
    /// are skipped without consuming budget.
    pub fn sample_cycle(&self) -> DetectResult<()> {
        self.inner.sample_cycle()
    }

    /// Interactive loop: render every frame, run detection in the
    /// background on every `frame_count`-th frame, return on the quit key.
    pub fn preview(&self, display: &mut dyn PreviewSink) -> DetectResult<()> {
        let mut counter: u64 = 0;
        let mut empty_run: u32 = 0;
        let cadence = u64::from(self.inner.frame_count);

        loop {
            let snapshot = {
                let mut camera = self.inner.camera.lock();
                let mut frame = self.inner.frame.lock();
                if !camera.read(&mut frame) {
                    return Err(DetectError::ReadFailed);
                }
                if frame.is_empty() {
                    None
                } else {
                    Some(frame.clone())
                }
            };

            let Some(snapshot) = snapshot else {
                empty_run += 1;
                if empty_run >= self.inner.max_empty_frames {
                    self.inner.logger.warn(format_args!(
                        "{} consecutive empty frames, leaving preview",
                        empty_run
                    ));
                    return Ok(());
                }
                continue;
            };
            empty_run = 0;

            if counter % cadence == 0 {
                self.dispatch(snapshot.clone(), counter);
            }

            display.show(&snapshot);
            if display.wait_key(1) == QUIT_KEY {
                self.inner.logger.info(format_args!("Quitting..."));
                return Ok(());
            }

            counter += 1;
            if !self.inner.frame_delay.is_zero() {
                std::thread::sleep(self.inner.frame_delay);
            }
        }
    }

    /// Start background detection on `snapshot`. Returns false if the
    /// previous dispatch is still running and this one was dropped.
    fn dispatch(&self, snapshot: Frame, counter: u64) -> bool {
        if self.inner.in_flight.swap(true, Ordering::SeqCst) {
            self.inner
                .logger
                .debug(format_args!("Detection in flight, dropping frame {}", counter));
            return false;
        }

        let guard = InFlight(self.inner.clone());
        let spawned = std::thread::Builder::new()
            .name("gohome-detect".to_string())
            .spawn(move || {
                let inner = &guard.0;
                let mut frame = snapshot;
                let detection =
                    detect_and_annotate(inner.capability.as_ref(), &mut frame, inner.logger.as_ref());
                if detection.is_positive() {
                    inner.save(&frame, counter);
                }
            });

        match spawned {
            Ok(_) => true,
            Err(e) => {
                // The guard went down with the closure and reset the flag.
                self.inner
                    .logger
                    .error(format_args!("Failed to spawn detection thread: {}", e));
                false
            }
        }
    }

    /// Whether a preview detection is running.
    pub fn is_detecting(&self) -> bool {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Close the camera if it is open. Safe to call repeatedly.
    pub fn close_camera(&self) -> DetectResult<()> {
        let mut camera = self.inner.camera.lock();
        if camera.is_open() {
            camera.close()?;
            self.inner.logger.info(format_args!("Camera closed"));
        }
        Ok(())
    }

    /// Run the worker until it is stopped.
    pub async fn start_schedule(&self) -> ScheduleResult<()> {
        self.worker.clone().run().await
    }

    /// Stop the worker.
    pub async fn stop_schedule(&self) -> ScheduleResult<()> {
        self.worker.stop().await
    }

    /// Copy of the frame buffer.
    pub fn current_frame(&self) -> Frame {
        self.inner.frame.lock().clone()
    }
}

impl std::fmt::Debug for Detector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detector")
            .field("job", &self.job.id())
            .field("save_path", &self.inner.save_path)
            .field("frame_count", &self.inner.frame_count)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "detector_tests.rs"]
mod tests;
