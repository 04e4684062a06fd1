//! `gohome detect`: single-shot detection on an image file.

use std::path::Path;

use chrono::Local;
use tracing::{error, info};

use gohome_config::Config;
use gohome_schedule::TracingLogSink;
use gohome_detect::{
    DetectionCapability, FileImageSink, ImageSink, detect_and_annotate, image_file_name, load_frame,
};

use crate::register::build_motion_detector;

/// Annotate `input` and write `<output>/<timestamp>.jpg` if anything was
/// detected. With a `reference` image the detector compares against it.
pub(crate) fn detect(
    config: &Config,
    input: &Path,
    output: &Path,
    reference: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut frame = load_frame(input).map_err(|e| {
        error!("Cannot read image {}: {}", input.display(), e);
        e
    })?;

    let capability = build_motion_detector(config);
    if let Some(reference) = reference {
        capability.detect(&load_frame(reference)?);
    }

    let detection = detect_and_annotate(&capability, &mut frame, &TracingLogSink::new("detect"));
    if !detection.is_positive() {
        info!("Nothing detected in {}", input.display());
        return Ok(());
    }

    let name = output.join(image_file_name(Local::now().naive_local(), None, "jpg"));
    if !FileImageSink.write(&name, &frame) {
        return Err(format!("Failed to save image: {}", name.display()).into());
    }
    info!("Saved image: {}", name.display());
    Ok(())
}
