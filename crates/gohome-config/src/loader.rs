//! Configuration loader.

use std::fs;
use std::path::Path;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::schema::Config;

/// Config file read when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "config/gohome.toml";

/// Configuration loader with environment variable substitution.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path)?;
        Self::load_str(&content)
    }

    /// Load configuration from a string.
    pub fn load_str(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        let mut config: Config = toml::from_str(&expanded)?;
        Self::expand_paths(&mut config);
        Ok(config)
    }

    /// Load `path` if it exists, defaults otherwise, then apply process
    /// environment overrides.
    pub fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
        let mut config = match Self::load(path) {
            Ok(config) => config,
            Err(ConfigError::NotFound(_)) => {
                debug!("No config at {}, using defaults", path.display());
                Config::default()
            }
            Err(e) => return Err(e),
        };
        Self::apply_env_overrides(&mut config);
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(config: &mut Config) {
        Self::apply_overrides(config, |key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`.
    ///
    /// Numeric values that do not parse are ignored and the current value is
    /// kept.
    pub fn apply_overrides<F>(config: &mut Config, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let detector = &mut config.detector;
        override_parsed(&lookup, "SCHEDULE_DURATION", &mut detector.schedule_interval_secs);
        override_parsed(&lookup, "FRAME_COUNT", &mut detector.frame_count);
        override_parsed(&lookup, "FRAME_DELAY", &mut detector.frame_delay_ms);

        let mut width = 0u32;
        override_parsed(&lookup, "WINDOW_WIDTH", &mut width);
        if width > 0 {
            config.preview.width = Some(width);
        }
        let mut height = 0u32;
        override_parsed(&lookup, "WINDOW_HEIGHT", &mut height);
        if height > 0 {
            config.preview.height = Some(height);
        }

        if let Some(camera) = lookup("GOHOME_CAMERA").filter(|v| !v.is_empty()) {
            config.detector.camera = Some(Self::expand_path(&camera));
        }
        if let Some(save_path) = lookup("GOHOME_SAVE_PATH") {
            config.detector.save_path = Self::expand_path(&save_path);
        }
    }

    /// Expand environment variables in the format `${VAR}`.
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;
        let mut result = content.to_string();

        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let var_value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotSet(var_name.to_string()))?;
            result = result.replace(&cap[0], &var_value);
        }

        Ok(result)
    }

    fn expand_paths(config: &mut Config) {
        if let Some(camera) = config.detector.camera.as_mut() {
            *camera = Self::expand_path(camera);
        }
        config.detector.save_path = Self::expand_path(&config.detector.save_path);
        config.preview.output = Self::expand_path(&config.preview.output);
        config.logging.dir = Self::expand_path(&config.logging.dir);
    }

    /// Expand shell-style paths (e.g., `~/camera.jpg`).
    pub fn expand_path(path: &str) -> String {
        shellexpand::tilde(path).to_string()
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *target = value,
        Err(_) => warn!("Ignoring {}={:?}: not a number", key, raw),
    }
}
