//! Detect-and-annotate, shared by sampling, preview and single-shot paths.

use gohome_schedule::LogSink;
use image::{Rgb, RgbImage};

use crate::capability::DetectionCapability;
use crate::frame::{Detection, Frame, Region};

/// Outline color for detected regions.
pub const ANNOTATION_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Outline thickness in pixels.
pub const ANNOTATION_THICKNESS: u32 = 3;

/// Run detection on `frame`, outline every region in place and report it to `logger`.
pub fn detect_and_annotate(
    capability: &dyn DetectionCapability,
    frame: &mut Frame,
    logger: &dyn LogSink,
) -> Detection {
    let regions = capability.detect(frame);
    for region in &regions {
        draw_rectangle(
            frame.image_mut(),
            region,
            ANNOTATION_COLOR,
            ANNOTATION_THICKNESS,
        );
        logger.info(format_args!("Detected object at: {}", region));
    }
    Detection::new(regions)
}

/// Draw a rectangle outline, growing inwards by `thickness` pixels.
///
/// Coordinates outside the image are clamped.
pub fn draw_rectangle(image: &mut RgbImage, region: &Region, color: Rgb<u8>, thickness: u32) {
    let width = image.width() as i64;
    let height = image.height() as i64;
    if width == 0 || height == 0 || region.is_empty() {
        return;
    }

    let left = (region.x as i64).clamp(0, width - 1);
    let top = (region.y as i64).clamp(0, height - 1);
    let right = (region.right() as i64 - 1).clamp(0, width - 1);
    let bottom = (region.bottom() as i64 - 1).clamp(0, height - 1);

    for inset in 0..thickness.max(1) as i64 {
        let (l, t, r, b) = (left + inset, top + inset, right - inset, bottom - inset);
        if l > r || t > b {
            break;
        }
        for x in l..=r {
            image.put_pixel(x as u32, t as u32, color);
            image.put_pixel(x as u32, b as u32, color);
        }
        for y in t..=b {
            image.put_pixel(l as u32, y as u32, color);
            image.put_pixel(r as u32, y as u32, color);
        }
    }
}
