//! Configuration schema.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub detector: DetectorConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub preview: PreviewConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub motion: MotionConfig,
}

/// Camera sampling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Snapshot path the camera keeps overwriting.
    #[serde(default)]
    pub camera: Option<String>,

    /// Directory for positive frames. Empty disables saving.
    #[serde(default = "default_save_path")]
    pub save_path: String,

    #[serde(default = "default_image_ext")]
    pub image_ext: String,

    #[serde(default = "default_schedule_interval_secs")]
    pub schedule_interval_secs: u64,

    #[serde(default = "default_frame_count")]
    pub frame_count: u32,

    #[serde(default = "default_frame_delay_ms")]
    pub frame_delay_ms: u64,

    #[serde(default = "default_max_empty_frames")]
    pub max_empty_frames: u32,
}

impl DetectorConfig {
    pub fn schedule_interval(&self) -> Duration {
        Duration::from_secs(self.schedule_interval_secs)
    }

    pub fn frame_delay(&self) -> Duration {
        Duration::from_millis(self.frame_delay_ms)
    }

    /// Save directory, or `None` when saving is disabled.
    pub fn save_dir(&self) -> Option<PathBuf> {
        if self.save_path.trim().is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.save_path))
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            camera: None,
            save_path: default_save_path(),
            image_ext: default_image_ext(),
            schedule_interval_secs: default_schedule_interval_secs(),
            frame_count: default_frame_count(),
            frame_delay_ms: default_frame_delay_ms(),
            max_empty_frames: default_max_empty_frames(),
        }
    }
}

fn default_save_path() -> String {
    "./logs/detected".to_string()
}

fn default_image_ext() -> String {
    "jpg".to_string()
}

fn default_schedule_interval_secs() -> u64 {
    1
}

fn default_frame_count() -> u32 {
    60
}

fn default_frame_delay_ms() -> u64 {
    1
}

fn default_max_empty_frames() -> u32 {
    1000
}

/// Worker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Cron expression of the stats report.
    #[serde(default = "default_stats_schedule")]
    pub stats_schedule: String,

    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            stats_schedule: default_stats_schedule(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_stats_schedule() -> String {
    "0 * * * * *".to_string()
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

/// Preview window settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewConfig {
    #[serde(default)]
    pub width: Option<u32>,

    #[serde(default)]
    pub height: Option<u32>,

    /// File the headless preview keeps overwriting.
    #[serde(default = "default_preview_output")]
    pub output: String,
}

impl PreviewConfig {
    /// Target size when both dimensions are set.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            output: default_preview_output(),
        }
    }
}

fn default_preview_output() -> String {
    "./logs/preview.jpg".to_string()
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,

    #[serde(default = "default_log_prefix")]
    pub file_prefix: String,

    /// Filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Rotated files kept on disk.
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Write the file log as JSON lines.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            file_prefix: default_log_prefix(),
            level: default_log_level(),
            max_files: default_max_files(),
            json: false,
        }
    }
}

fn default_log_dir() -> String {
    "./logs".to_string()
}

fn default_log_prefix() -> String {
    "gohome".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_files() -> usize {
    30
}

/// Frame-differencing detector tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionConfig {
    #[serde(default = "default_grid")]
    pub grid: u32,

    /// Mean luminance change (0-255) that marks a cell as moving.
    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            grid: default_grid(),
            threshold: default_threshold(),
        }
    }
}

fn default_grid() -> u32 {
    16
}

fn default_threshold() -> f32 {
    12.0
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
