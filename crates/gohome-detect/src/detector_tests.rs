//! Tests for the detector.

use super::*;
use std::collections::VecDeque;
use std::sync::atomic::AtomicUsize;

use chrono::NaiveDate;
use gohome_schedule::{ScheduleError, WorkerConfig};
use image::RgbImage;
use tempfile::TempDir;

use crate::error::SourceError;
use crate::frame::Region;

/// Scripted camera: `Some(frame)` is delivered, `None` fails the read.
/// Once the script runs out, `fallback` repeats forever.
struct ScriptedSource {
    script: VecDeque<Option<Frame>>,
    fallback: Option<Frame>,
    reads: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    open: bool,
}

impl ScriptedSource {
    fn repeating(frame: Frame) -> Self {
        Self {
            script: VecDeque::new(),
            fallback: Some(frame),
            reads: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
            open: true,
        }
    }

    fn then(mut self, step: Option<Frame>) -> Self {
        self.script.push_back(step);
        self
    }
}

impl FrameSource for ScriptedSource {
    fn read(&mut self, frame: &mut Frame) -> bool {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let step = match self.script.pop_front() {
            Some(step) => step,
            None => self.fallback.clone(),
        };
        match step {
            Some(next) => {
                *frame = next;
                true
            }
            None => false,
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) -> Result<(), SourceError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.open = false;
        Ok(())
    }
}

/// Reports a region on the call with index `positive_on`, nothing otherwise.
struct CountingCapability {
    calls: AtomicUsize,
    positive_on: Option<usize>,
    delay: Duration,
}

impl CountingCapability {
    fn never() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            positive_on: None,
            delay: Duration::ZERO,
        }
    }

    fn positive_on(call: usize) -> Self {
        Self {
            positive_on: Some(call),
            ..Self::never()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DetectionCapability for CountingCapability {
    fn detect(&self, _frame: &Frame) -> Vec<Region> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if Some(call) == self.positive_on {
            vec![Region::new(1, 1, 4, 4)]
        } else {
            Vec::new()
        }
    }
}

#[derive(Default)]
struct RecordingSink {
    paths: Mutex<Vec<PathBuf>>,
    succeed: bool,
}

impl RecordingSink {
    fn ok() -> Self {
        Self {
            succeed: true,
            ..Self::default()
        }
    }

    fn failing() -> Self {
        Self::default()
    }

    fn paths(&self) -> Vec<PathBuf> {
        self.paths.lock().clone()
    }
}

impl ImageSink for RecordingSink {
    fn write(&self, path: &Path, _frame: &Frame) -> bool {
        self.paths.lock().push(path.to_path_buf());
        self.succeed
    }
}

/// Keeps every reported line, prefixed with its level.
#[derive(Default)]
struct RecordingLog {
    lines: Mutex<Vec<String>>,
}

impl RecordingLog {
    fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|line| line.contains(needle))
    }
}

impl gohome_schedule::LogSink for RecordingLog {
    fn debug(&self, args: std::fmt::Arguments<'_>) {
        self.lines.lock().push(format!("DEBUG {}", args));
    }
    fn info(&self, args: std::fmt::Arguments<'_>) {
        self.lines.lock().push(format!("INFO {}", args));
    }
    fn warn(&self, args: std::fmt::Arguments<'_>) {
        self.lines.lock().push(format!("WARN {}", args));
    }
    fn error(&self, args: std::fmt::Arguments<'_>) {
        self.lines.lock().push(format!("ERROR {}", args));
    }
}

/// Shows frames and presses `q` after `quit_after` renders.
struct ScriptedPreview {
    shown: usize,
    quit_after: usize,
}

impl PreviewSink for ScriptedPreview {
    fn show(&mut self, _frame: &Frame) {
        self.shown += 1;
    }

    fn wait_key(&mut self, _timeout_ms: u32) -> i32 {
        if self.shown >= self.quit_after { QUIT_KEY } else { -1 }
    }
}

fn frame() -> Frame {
    Frame::new(RgbImage::new(8, 8))
}

fn worker() -> Arc<Worker> {
    Arc::new(Worker::new(WorkerConfig::default()).unwrap())
}

fn config(
    camera: ScriptedSource,
    capability: Arc<CountingCapability>,
    sink: Arc<RecordingSink>,
) -> DetectorConfig {
    DetectorConfig::new(capability, sink)
        .with_camera(Box::new(camera))
        .with_frame_delay(Duration::ZERO)
}

#[test]
fn test_image_file_name() {
    let at = NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(3, 4, 5)
        .unwrap();
    assert_eq!(image_file_name(at, Some(7), "jpg"), "20240102030405_7.jpg");
    assert_eq!(image_file_name(at, None, "png"), "20240102030405.png");
}

#[test]
fn test_new_requires_camera() {
    let config = DetectorConfig::new(
        Arc::new(CountingCapability::never()),
        Arc::new(RecordingSink::ok()),
    );
    let result = Detector::new(config, worker());
    assert!(matches!(result, Err(DetectError::CameraMissing)));
}

#[test]
fn test_new_rejects_zero_frame_count() {
    let config = config(
        ScriptedSource::repeating(frame()),
        Arc::new(CountingCapability::never()),
        Arc::new(RecordingSink::ok()),
    )
    .with_frame_count(0);
    assert!(matches!(
        Detector::new(config, worker()),
        Err(DetectError::InvalidConfig(_))
    ));
}

#[test]
fn test_new_propagates_registration_error() {
    let config = config(
        ScriptedSource::repeating(frame()),
        Arc::new(CountingCapability::never()),
        Arc::new(RecordingSink::ok()),
    )
    .with_schedule_interval(Duration::ZERO);
    assert!(matches!(
        Detector::new(config, worker()),
        Err(DetectError::Schedule(ScheduleError::InvalidInterval(_)))
    ));
}

#[test]
fn test_new_registers_named_job() {
    let worker = worker();
    let detector = Detector::new(
        config(
            ScriptedSource::repeating(frame()),
            Arc::new(CountingCapability::never()),
            Arc::new(RecordingSink::ok()),
        ),
        worker.clone(),
    )
    .unwrap();

    let job = worker.find_job_by_name(DETECTOR_JOB_NAME).unwrap();
    assert_eq!(job.id(), detector.job().id());
    assert_eq!(job.tags(), [DETECTOR_JOB_TAG]);
}

#[test]
fn test_cycle_reads_at_most_budget_without_detection() {
    for budget in [1u32, 5, 60] {
        let source = ScriptedSource::repeating(frame());
        let reads = source.reads.clone();
        let capability = Arc::new(CountingCapability::never());
        let sink = Arc::new(RecordingSink::ok());
        let detector = Detector::new(
            config(source, capability.clone(), sink.clone())
                .with_frame_count(budget)
                .with_save_path("/tmp/detected"),
            worker(),
        )
        .unwrap();

        detector.sample_cycle().unwrap();
        assert_eq!(reads.load(Ordering::SeqCst), budget as usize);
        assert_eq!(capability.calls(), budget as usize);
        assert!(sink.paths().is_empty());
    }
}

#[test]
fn test_positive_detection_ends_cycle_and_saves() {
    let source = ScriptedSource::repeating(frame());
    let reads = source.reads.clone();
    let capability = Arc::new(CountingCapability::positive_on(2));
    let sink = Arc::new(RecordingSink::ok());
    let detector = Detector::new(
        config(source, capability.clone(), sink.clone()).with_save_path("/tmp/detected"),
        worker(),
    )
    .unwrap();

    detector.sample_cycle().unwrap();
    assert_eq!(reads.load(Ordering::SeqCst), 3);

    let paths = sink.paths();
    assert_eq!(paths.len(), 1);
    assert!(paths[0].starts_with("/tmp/detected"));
    let name = paths[0].file_name().unwrap().to_string_lossy().to_string();
    assert!(name.ends_with("_2.jpg"), "unexpected name {}", name);
    assert_eq!(name.len(), "20240102030405_2.jpg".len());
}

#[test]
fn test_positive_frame_is_annotated_in_buffer() {
    let detector = Detector::new(
        config(
            ScriptedSource::repeating(frame()),
            Arc::new(CountingCapability::positive_on(0)),
            Arc::new(RecordingSink::ok()),
        ),
        worker(),
    )
    .unwrap();

    detector.sample_cycle().unwrap();
    let current = detector.current_frame();
    assert_eq!(*current.image().get_pixel(1, 1), crate::ANNOTATION_COLOR);
}

#[test]
fn test_no_save_path_disables_writes() {
    let sink = Arc::new(RecordingSink::ok());
    let detector = Detector::new(
        config(
            ScriptedSource::repeating(frame()),
            Arc::new(CountingCapability::positive_on(0)),
            sink.clone(),
        ),
        worker(),
    )
    .unwrap();

    detector.sample_cycle().unwrap();
    assert!(sink.paths().is_empty());
}

#[test]
fn test_failing_sink_still_succeeds() {
    let sink = Arc::new(RecordingSink::failing());
    let log = Arc::new(RecordingLog::default());
    let detector = Detector::new(
        config(
            ScriptedSource::repeating(frame()),
            Arc::new(CountingCapability::positive_on(0)),
            sink.clone(),
        )
        .with_save_path("/nonexistent/detected")
        .with_logger(log.clone()),
        worker(),
    )
    .unwrap();

    assert!(detector.sample_cycle().is_ok());
    assert_eq!(sink.paths().len(), 1);
    assert!(log.contains("ERROR Failed to save image: /nonexistent/detected/"));
    assert!(!log.contains("Saved image"));
}

#[test]
fn test_construction_and_detections_are_reported() {
    let log = Arc::new(RecordingLog::default());
    let dir = TempDir::new().unwrap();
    let detector = Detector::new(
        config(
            ScriptedSource::repeating(frame()),
            Arc::new(CountingCapability::positive_on(0)),
            Arc::new(RecordingSink::ok()),
        )
        .with_save_path(dir.path())
        .with_logger(log.clone()),
        worker(),
    )
    .unwrap();

    assert!(log.contains("INFO camera is true"));
    assert!(log.contains("INFO saveImagePath: "));
    assert!(log.contains(&format!("Name={}", DETECTOR_JOB_NAME)));

    detector.sample_cycle().unwrap();
    assert!(log.contains("INFO Detected object at: (1,1)-(5,5)"));
    assert!(log.contains("INFO Saved image: "));
}

#[test]
fn test_read_failure_is_an_error() {
    let source = ScriptedSource::repeating(frame()).then(Some(frame())).then(None);
    let detector = Detector::new(
        config(
            source,
            Arc::new(CountingCapability::never()),
            Arc::new(RecordingSink::ok()),
        ),
        worker(),
    )
    .unwrap();

    assert!(matches!(detector.sample_cycle(), Err(DetectError::ReadFailed)));
}

#[test]
fn test_empty_frames_are_skipped_without_budget() {
    let source = ScriptedSource::repeating(frame())
        .then(Some(Frame::empty()))
        .then(Some(Frame::empty()))
        .then(Some(Frame::empty()))
        .then(Some(frame()));
    let reads = source.reads.clone();
    let capability = Arc::new(CountingCapability::positive_on(0));
    let detector = Detector::new(
        config(source, capability.clone(), Arc::new(RecordingSink::ok())).with_frame_count(1),
        worker(),
    )
    .unwrap();

    detector.sample_cycle().unwrap();
    assert_eq!(reads.load(Ordering::SeqCst), 4);
    assert_eq!(capability.calls(), 1);
}

#[test]
fn test_endless_empty_frames_end_cycle() {
    let source = ScriptedSource::repeating(Frame::empty());
    let reads = source.reads.clone();
    let capability = Arc::new(CountingCapability::never());
    let detector = Detector::new(
        config(source, capability.clone(), Arc::new(RecordingSink::ok()))
            .with_max_empty_frames(25),
        worker(),
    )
    .unwrap();

    detector.sample_cycle().unwrap();
    assert_eq!(reads.load(Ordering::SeqCst), 25);
    assert_eq!(capability.calls(), 0);
}

#[test]
fn test_close_camera_is_idempotent() {
    let source = ScriptedSource::repeating(frame());
    let closes = source.closes.clone();
    let detector = Detector::new(
        config(
            source,
            Arc::new(CountingCapability::never()),
            Arc::new(RecordingSink::ok()),
        ),
        worker(),
    )
    .unwrap();

    detector.close_camera().unwrap();
    detector.close_camera().unwrap();
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_preview_quits_on_key() {
    let detector = Detector::new(
        config(
            ScriptedSource::repeating(frame()),
            Arc::new(CountingCapability::never()),
            Arc::new(RecordingSink::ok()),
        ),
        worker(),
    )
    .unwrap();

    let mut display = ScriptedPreview {
        shown: 0,
        quit_after: 3,
    };
    detector.preview(&mut display).unwrap();
    assert_eq!(display.shown, 3);
}

#[test]
fn test_preview_read_failure() {
    let source = ScriptedSource::repeating(frame()).then(None);
    let detector = Detector::new(
        config(
            source,
            Arc::new(CountingCapability::never()),
            Arc::new(RecordingSink::ok()),
        ),
        worker(),
    )
    .unwrap();

    let mut display = ScriptedPreview {
        shown: 0,
        quit_after: 100,
    };
    assert!(matches!(
        detector.preview(&mut display),
        Err(DetectError::ReadFailed)
    ));
}

#[test]
fn test_preview_dispatches_on_cadence() {
    let capability = Arc::new(CountingCapability::never());
    let detector = Detector::new(
        config(
            ScriptedSource::repeating(frame()),
            capability.clone(),
            Arc::new(RecordingSink::ok()),
        )
        .with_frame_count(4)
        .with_frame_delay(Duration::from_millis(20)),
        worker(),
    )
    .unwrap();

    // Frames 0, 4 and 8 are sampled.
    let mut display = ScriptedPreview {
        shown: 0,
        quit_after: 10,
    };
    detector.preview(&mut display).unwrap();
    std::thread::sleep(Duration::from_millis(100));

    assert_eq!(capability.calls(), 3);
    assert!(!detector.is_detecting());
}

#[test]
fn test_preview_drops_overlapping_dispatch() {
    let capability = Arc::new(CountingCapability {
        delay: Duration::from_millis(300),
        ..CountingCapability::positive_on(0)
    });
    let sink = Arc::new(RecordingSink::ok());
    let detector = Detector::new(
        config(
            ScriptedSource::repeating(frame()),
            capability.clone(),
            sink.clone(),
        )
        .with_frame_count(1)
        .with_save_path("/tmp/detected"),
        worker(),
    )
    .unwrap();

    let mut display = ScriptedPreview {
        shown: 0,
        quit_after: 5,
    };
    detector.preview(&mut display).unwrap();
    assert!(detector.is_detecting());

    std::thread::sleep(Duration::from_millis(500));
    assert_eq!(capability.calls(), 1);
    assert!(!detector.is_detecting());

    let paths = sink.paths();
    assert_eq!(paths.len(), 1);
    assert!(paths[0].to_string_lossy().ends_with("_0.jpg"));
}

#[test]
fn test_dispatched_detection_does_not_touch_buffer() {
    let detector = Detector::new(
        config(
            ScriptedSource::repeating(frame()),
            Arc::new(CountingCapability::positive_on(0)),
            Arc::new(RecordingSink::ok()),
        )
        .with_frame_count(1),
        worker(),
    )
    .unwrap();

    let mut display = ScriptedPreview {
        shown: 0,
        quit_after: 1,
    };
    detector.preview(&mut display).unwrap();
    std::thread::sleep(Duration::from_millis(100));

    assert_eq!(detector.current_frame(), frame());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_schedule_runs_sampling_job() {
    let dir = TempDir::new().unwrap();
    let worker = Arc::new(
        Worker::new(WorkerConfig::default().with_poll_interval(Duration::from_millis(50)))
            .unwrap(),
    );
    let capability = Arc::new(CountingCapability::never());
    let detector = Arc::new(
        Detector::new(
            config(
                ScriptedSource::repeating(frame()),
                capability.clone(),
                Arc::new(RecordingSink::ok()),
            )
            .with_schedule_interval(Duration::from_millis(100))
            .with_frame_count(2)
            .with_save_path(dir.path()),
            worker,
        )
        .unwrap(),
    );

    let runner = detector.clone();
    let handle = tokio::spawn(async move { runner.start_schedule().await });
    tokio::time::sleep(Duration::from_millis(350)).await;
    detector.stop_schedule().await.unwrap();
    handle.await.unwrap().unwrap();
    detector.close_camera().unwrap();

    assert!(capability.calls() >= 2);
    assert!(detector.job().last_run().is_some());
    assert!(detector.job().last_error().is_none());
}
