//! gohome - scheduled camera sampling with save-on-detect.
//!
//! Main entry point for the gohome CLI.

mod cli;
mod cmd_detect;
mod cmd_preview;
mod cmd_run;
mod register;

use std::path::Path;

use clap::Parser;
use tracing::warn;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use gohome_config::{Config, ConfigLoader, ConfigValidator, LoggingConfig, ValidationWarning};

use crate::cli::{Cli, Commands};

fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let log_dir = Path::new(&logging.dir);
    std::fs::create_dir_all(log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(&logging.file_prefix)
        .filename_suffix("log")
        .max_log_files(logging.max_files)
        .build(log_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // The guard flushes the file writer on drop; keep it for the whole run.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = if logging.json {
        fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_ansi(false)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_ansi(true))
        .with(file_layer)
        .init();

    Ok(())
}

/// File, then environment, then command-line flags.
fn load_config(cli: &Cli) -> Result<(Config, Vec<ValidationWarning>), Box<dyn std::error::Error>> {
    let mut config = ConfigLoader::load_or_default(&cli.config)?;

    match &cli.command {
        Some(Commands::Run { detector }) => detector.apply(&mut config),
        Some(Commands::Preview {
            detector,
            output,
            width,
            height,
        }) => {
            detector.apply(&mut config);
            if let Some(output) = output {
                config.preview.output = output.display().to_string();
            }
            if width.is_some() {
                config.preview.width = *width;
            }
            if height.is_some() {
                config.preview.height = *height;
            }
        }
        Some(Commands::Detect { .. }) | None => {}
    }

    let warnings = ConfigValidator::validate(&config).into_result()?;
    Ok((config, warnings))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let (config, warnings) = load_config(&cli)?;

    init_tracing(&config.logging)?;
    for warning in &warnings {
        warn!("{}: {}", warning.path, warning.message);
    }

    match cli.command {
        None => cmd_run::run(config).await,
        Some(Commands::Run { .. }) => cmd_run::run(config).await,
        Some(Commands::Preview { .. }) => cmd_preview::preview(config).await,
        Some(Commands::Detect {
            input,
            output,
            reference,
        }) => cmd_detect::detect(&config, &input, &output, reference.as_deref()),
    }
}
