//! Worker and detector construction from configuration.

use std::sync::Arc;

use tracing::info;

use gohome_config::Config;
use gohome_detect::{Detector, DetectorConfig, FileImageSink, MotionDetector, SnapshotSource};
use gohome_schedule::{ScheduleResult, TracingLogSink, Worker, WorkerConfig};

/// Build the worker, reporting through `tracing` under the `scheduler` component.
pub(crate) fn build_worker(config: &Config) -> ScheduleResult<Arc<Worker>> {
    let worker_config = WorkerConfig::default()
        .with_poll_interval(config.scheduler.poll_interval())
        .with_stats_schedule(config.scheduler.stats_schedule.clone())
        .with_shutdown_timeout(config.scheduler.shutdown_timeout())
        .with_logger(Arc::new(TracingLogSink::new("scheduler")));

    Ok(Arc::new(Worker::new(worker_config)?))
}

pub(crate) fn build_motion_detector(config: &Config) -> MotionDetector {
    MotionDetector::new(config.motion.grid, config.motion.threshold)
}

/// Build the detector and register its sampling job on `worker`.
pub(crate) fn build_detector(
    config: &Config,
    worker: Arc<Worker>,
) -> gohome_detect::DetectResult<Arc<Detector>> {
    let settings = &config.detector;
    let mut detector_config = DetectorConfig::new(
        Arc::new(build_motion_detector(config)),
        Arc::new(FileImageSink),
    )
    .with_image_ext(settings.image_ext.clone())
    .with_schedule_interval(settings.schedule_interval())
    .with_frame_count(settings.frame_count)
    .with_frame_delay(settings.frame_delay())
    .with_max_empty_frames(settings.max_empty_frames)
    .with_logger(Arc::new(TracingLogSink::new("detector")));

    if let Some(camera) = settings.camera.as_deref().filter(|c| !c.is_empty()) {
        info!("Opening camera snapshot {}", camera);
        detector_config = detector_config.with_camera(Box::new(SnapshotSource::new(camera)));
    }
    if let Some(dir) = settings.save_dir() {
        detector_config = detector_config.with_save_path(dir);
    }

    Ok(Arc::new(Detector::new(detector_config, worker)?))
}
