//! Frame-differencing motion detector.

use image::RgbImage;
use parking_lot::Mutex;

use crate::capability::DetectionCapability;
use crate::frame::{Frame, Region};

/// Largest supported lattice side; larger values are clamped to it.
pub const MAX_GRID: u32 = 256;

const DEFAULT_GRID: u32 = 16;
const DEFAULT_THRESHOLD: f32 = 12.0;

struct Cells {
    width: u32,
    height: u32,
    means: Vec<f32>,
}

/// Splits each frame into a `grid x grid` lattice and compares the mean
/// luminance of every cell against the previous frame.
///
/// Changed cells are grouped by 4-connectivity and each group is reported as
/// one bounding region. The first frame, and any frame whose size differs
/// from the previous one, only primes the detector.
pub struct MotionDetector {
    grid: u32,
    threshold: f32,
    previous: Mutex<Option<Cells>>,
}

impl MotionDetector {
    /// `grid` is clamped to `1..=MAX_GRID`.
    pub fn new(grid: u32, threshold: f32) -> Self {
        Self {
            grid: grid.clamp(1, MAX_GRID),
            threshold,
            previous: Mutex::new(None),
        }
    }

    pub fn grid(&self) -> u32 {
        self.grid
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    fn cell_size(&self, width: u32, height: u32) -> (u32, u32) {
        (width.div_ceil(self.grid), height.div_ceil(self.grid))
    }

    fn measure(&self, image: &RgbImage) -> Cells {
        let (width, height) = image.dimensions();
        let (cell_w, cell_h) = self.cell_size(width, height);
        let grid = self.grid as usize;
        let cells = grid * grid;
        let mut sums = vec![0f64; cells];
        let mut counts = vec![0u32; cells];

        for (x, y, pixel) in image.enumerate_pixels() {
            let [r, g, b] = pixel.0;
            let luma = 0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64;
            let index = (y / cell_h) as usize * grid + (x / cell_w) as usize;
            sums[index] += luma;
            counts[index] += 1;
        }

        let means = sums
            .iter()
            .zip(&counts)
            .map(|(sum, &count)| if count == 0 { 0.0 } else { (sum / count as f64) as f32 })
            .collect();

        Cells {
            width,
            height,
            means,
        }
    }

    fn group(&self, changed: &[bool], width: u32, height: u32) -> Vec<Region> {
        let (cell_w, cell_h) = self.cell_size(width, height);
        let grid = self.grid as usize;
        let mut seen = vec![false; changed.len()];
        let mut regions = Vec::new();

        for start in 0..changed.len() {
            if !changed[start] || seen[start] {
                continue;
            }
            seen[start] = true;
            let mut stack = vec![start];
            let (mut min_cx, mut min_cy) = (usize::MAX, usize::MAX);
            let (mut max_cx, mut max_cy) = (0usize, 0usize);

            while let Some(cell) = stack.pop() {
                let (cx, cy) = (cell % grid, cell / grid);
                min_cx = min_cx.min(cx);
                min_cy = min_cy.min(cy);
                max_cx = max_cx.max(cx);
                max_cy = max_cy.max(cy);

                let mut neighbours = Vec::with_capacity(4);
                if cx > 0 {
                    neighbours.push(cell - 1);
                }
                if cx + 1 < grid {
                    neighbours.push(cell + 1);
                }
                if cy > 0 {
                    neighbours.push(cell - grid);
                }
                if cy + 1 < grid {
                    neighbours.push(cell + grid);
                }
                for next in neighbours {
                    if changed[next] && !seen[next] {
                        seen[next] = true;
                        stack.push(next);
                    }
                }
            }

            let x = min_cx as u32 * cell_w;
            let y = min_cy as u32 * cell_h;
            let right = ((max_cx as u32 + 1) * cell_w).min(width);
            let bottom = ((max_cy as u32 + 1) * cell_h).min(height);
            if right > x && bottom > y {
                regions.push(Region::new(x, y, right - x, bottom - y));
            }
        }
        regions
    }
}

impl Default for MotionDetector {
    fn default() -> Self {
        Self::new(DEFAULT_GRID, DEFAULT_THRESHOLD)
    }
}

impl DetectionCapability for MotionDetector {
    fn detect(&self, frame: &Frame) -> Vec<Region> {
        if frame.is_empty() {
            return Vec::new();
        }

        let current = self.measure(frame.image());
        let mut previous = self.previous.lock();
        let regions = match previous.as_ref() {
            Some(prev) if prev.width == current.width && prev.height == current.height => {
                let changed: Vec<bool> = prev
                    .means
                    .iter()
                    .zip(&current.means)
                    .map(|(a, b)| (a - b).abs() > self.threshold)
                    .collect();
                self.group(&changed, current.width, current.height)
            }
            _ => Vec::new(),
        };
        *previous = Some(current);
        regions
    }
}

impl std::fmt::Debug for MotionDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotionDetector")
            .field("grid", &self.grid)
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}
