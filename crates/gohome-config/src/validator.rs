//! Configuration validation.

use gohome_detect::MAX_GRID;
use gohome_schedule::JobTrigger;

use crate::error::ConfigError;
use crate::schema::Config;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// The first error as a `ConfigError`, or the warnings if valid.
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(ConfigError::InvalidValue {
                field: error.path,
                message: error.message,
            }),
            None => Ok(self.warnings),
        }
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "tif", "tiff"];

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();
        Self::validate_detector(config, &mut result);
        Self::validate_scheduler(config, &mut result);
        Self::validate_preview(config, &mut result);
        Self::validate_logging(config, &mut result);
        Self::validate_motion(config, &mut result);
        result
    }

    fn validate_detector(config: &Config, result: &mut ValidationResult) {
        let detector = &config.detector;

        if detector.camera.as_deref().is_none_or(str::is_empty) {
            result.add_warning(ValidationWarning::new(
                "detector.camera",
                "No camera configured, run and preview will refuse to start",
            ));
        }
        if detector.frame_count == 0 {
            result.add_error(ValidationError::new(
                "detector.frame_count",
                "frame_count must be greater than 0",
            ));
        }
        if detector.schedule_interval_secs == 0 {
            result.add_error(ValidationError::new(
                "detector.schedule_interval_secs",
                "schedule_interval_secs must be greater than 0",
            ));
        }
        if detector.max_empty_frames == 0 {
            result.add_error(ValidationError::new(
                "detector.max_empty_frames",
                "max_empty_frames must be greater than 0",
            ));
        }
        if !IMAGE_EXTENSIONS.contains(&detector.image_ext.to_lowercase().as_str()) {
            result.add_error(ValidationError::new(
                "detector.image_ext",
                format!(
                    "Unsupported image extension '{}', valid values: {:?}",
                    detector.image_ext, IMAGE_EXTENSIONS
                ),
            ));
        }
    }

    fn validate_scheduler(config: &Config, result: &mut ValidationResult) {
        let scheduler = &config.scheduler;

        if scheduler.poll_interval_ms == 0 {
            result.add_error(ValidationError::new(
                "scheduler.poll_interval_ms",
                "poll_interval_ms must be greater than 0",
            ));
        }
        if let Err(e) = JobTrigger::cron(scheduler.stats_schedule.clone()).validate() {
            result.add_error(ValidationError::new(
                "scheduler.stats_schedule",
                e.to_string(),
            ));
        }
        if scheduler.shutdown_timeout_secs == 0 {
            result.add_warning(ValidationWarning::new(
                "scheduler.shutdown_timeout_secs",
                "shutdown_timeout_secs is 0, in-flight jobs will be reported as timed out",
            ));
        }
    }

    fn validate_preview(config: &Config, result: &mut ValidationResult) {
        let preview = &config.preview;
        if preview.width.is_some() != preview.height.is_some() {
            result.add_warning(ValidationWarning::new(
                "preview",
                "Only one of width/height is set, preview keeps the camera size",
            ));
        }
        if preview.output.trim().is_empty() {
            result.add_error(ValidationError::new(
                "preview.output",
                "output cannot be empty",
            ));
        }
    }

    fn validate_logging(config: &Config, result: &mut ValidationResult) {
        let logging = &config.logging;
        if logging.dir.trim().is_empty() {
            result.add_error(ValidationError::new("logging.dir", "dir cannot be empty"));
        }
        if logging.file_prefix.trim().is_empty() {
            result.add_error(ValidationError::new(
                "logging.file_prefix",
                "file_prefix cannot be empty",
            ));
        }
        if logging.max_files == 0 {
            result.add_error(ValidationError::new(
                "logging.max_files",
                "max_files must be greater than 0",
            ));
        }
    }

    fn validate_motion(config: &Config, result: &mut ValidationResult) {
        let motion = &config.motion;
        if motion.grid == 0 || motion.grid > MAX_GRID {
            result.add_error(ValidationError::new(
                "motion.grid",
                format!("grid must be within 1..={}", MAX_GRID),
            ));
        }
        if !(0.0..=255.0).contains(&motion.threshold) {
            result.add_error(ValidationError::new(
                "motion.threshold",
                "threshold must be within 0..=255",
            ));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
