//! `gohome preview`: continuous render with background detection.

use std::path::{Path, PathBuf};
use std::time::Duration;

use image::ImageFormat;
use image::imageops::{self, FilterType};
use tracing::{info, warn};

use gohome_config::Config;
use gohome_daemon::{ShutdownSequence, SignalHandler};
use gohome_detect::{Frame, PreviewSink, QUIT_KEY};

use crate::register::{build_detector, build_worker};

/// Writes every frame to one image file and reports the quit key once a
/// shutdown signal has arrived.
pub(crate) struct HeadlessPreview {
    output: PathBuf,
    size: Option<(u32, u32)>,
    signals: SignalHandler,
    shown: u64,
}

impl HeadlessPreview {
    pub fn new(output: impl Into<PathBuf>, size: Option<(u32, u32)>, signals: SignalHandler) -> Self {
        Self {
            output: output.into(),
            size,
            signals,
            shown: 0,
        }
    }

    fn render(&self, frame: &Frame) -> Result<(), String> {
        let format = ImageFormat::from_path(&self.output).map_err(|e| e.to_string())?;
        if let Some(parent) = self.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        // Written aside and renamed so viewers never see a partial file.
        let staging = staging_path(&self.output);
        let result = match self.size {
            Some((width, height)) => {
                imageops::resize(frame.image(), width, height, FilterType::Triangle)
                    .save_with_format(&staging, format)
            }
            None => frame.image().save_with_format(&staging, format),
        };
        result.map_err(|e| e.to_string())?;
        std::fs::rename(&staging, &self.output).map_err(|e| e.to_string())
    }
}

fn staging_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    output.with_file_name(name)
}

impl PreviewSink for HeadlessPreview {
    fn show(&mut self, frame: &Frame) {
        if let Err(e) = self.render(frame) {
            warn!("Failed to render preview {}: {}", self.output.display(), e);
        }
        self.shown += 1;
    }

    fn wait_key(&mut self, timeout_ms: u32) -> i32 {
        if self.signals.is_shutdown_requested() {
            return QUIT_KEY;
        }
        std::thread::sleep(Duration::from_millis(u64::from(timeout_ms)));
        -1
    }
}

pub(crate) async fn preview(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let signals = SignalHandler::new();
    signals.setup_os_signals()?;

    let worker = build_worker(&config)?;
    let detector = build_detector(&config, worker)?;
    let mut display = HeadlessPreview::new(
        &config.preview.output,
        config.preview.dimensions(),
        signals.clone(),
    );
    info!("Rendering preview to {}", config.preview.output);

    let looping = detector.clone();
    let result = tokio::task::spawn_blocking(move || {
        let result = looping.preview(&mut display);
        let shown = display.shown;
        info!("Preview rendered {} frames", shown);
        result
    })
    .await?;

    let close = detector.clone();
    ShutdownSequence::new()
        .step("close camera", async move {
            close.close_camera().map_err(anyhow::Error::from)
        })
        .run()
        .await?;

    result?;
    Ok(())
}
