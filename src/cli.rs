//! CLI definitions for gohome.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// gohome CLI.
#[derive(Parser)]
#[command(name = "gohome")]
#[command(about = "Camera sampling and detection scheduler")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        env = "GOHOME_CONFIG",
        default_value = gohome_config::DEFAULT_CONFIG_PATH,
        global = true
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Sample the camera on a schedule until SIGINT/SIGTERM (default)
    Run {
        #[command(flatten)]
        detector: DetectorArgs,
    },

    /// Render the camera continuously, detecting every N frames
    Preview {
        #[command(flatten)]
        detector: DetectorArgs,

        /// Preview image that is rewritten on every frame
        #[arg(long)]
        output: Option<PathBuf>,

        /// Preview width
        #[arg(long)]
        width: Option<u32>,

        /// Preview height
        #[arg(long)]
        height: Option<u32>,
    },

    /// Run detection once on an image file
    ///
    /// Detection compares against an earlier frame, so nothing is found
    /// unless --reference is given.
    Detect {
        /// Input image
        #[arg(short, long)]
        input: PathBuf,

        /// Directory for the annotated image
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Earlier image of the same scene to compare against (required to detect anything)
        #[arg(short, long)]
        reference: Option<PathBuf>,
    },
}

/// Detector overrides shared by `run` and `preview`.
#[derive(Args, Debug, Default)]
pub(crate) struct DetectorArgs {
    /// Camera snapshot path
    #[arg(long)]
    pub camera: Option<String>,

    /// Directory for detected frames (empty disables saving)
    #[arg(long)]
    pub save_path: Option<String>,

    /// Seconds between sampling cycles
    #[arg(long)]
    pub interval: Option<u64>,

    /// Frames examined per cycle
    #[arg(long)]
    pub frame_count: Option<u32>,

    /// Milliseconds between frames
    #[arg(long)]
    pub frame_delay: Option<u64>,
}

impl DetectorArgs {
    pub fn apply(&self, config: &mut gohome_config::Config) {
        let detector = &mut config.detector;
        if let Some(camera) = &self.camera {
            detector.camera = Some(camera.clone());
        }
        if let Some(save_path) = &self.save_path {
            detector.save_path = save_path.clone();
        }
        if let Some(interval) = self.interval {
            detector.schedule_interval_secs = interval;
        }
        if let Some(frame_count) = self.frame_count {
            detector.frame_count = frame_count;
        }
        if let Some(frame_delay) = self.frame_delay {
            detector.frame_delay_ms = frame_delay;
        }
    }
}
