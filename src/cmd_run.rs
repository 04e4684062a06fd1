//! `gohome run`: scheduled sampling until a shutdown signal.

use tracing::{error, info, warn};

use gohome_config::Config;
use gohome_daemon::{DaemonSignal, ShutdownSequence, SignalHandler};

use crate::register::{build_detector, build_worker};

pub(crate) async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting gohome v{}", env!("CARGO_PKG_VERSION"));

    let signals = SignalHandler::new();
    signals.setup_os_signals()?;
    spawn_force_exit(&signals);

    let worker = build_worker(&config)?;
    let detector = build_detector(&config, worker)?;

    let runner = detector.clone();
    let mut schedule = tokio::spawn(async move { runner.start_schedule().await });

    let finished_early = tokio::select! {
        _ = signals.wait_for_shutdown() => {
            info!("Shutdown requested");
            None
        }
        joined = &mut schedule => Some(joined),
    };

    let stop = detector.clone();
    let close = detector.clone();
    let shutdown = ShutdownSequence::new()
        .step("stop scheduler", async move {
            stop.stop_schedule().await.map_err(anyhow::Error::from)
        })
        .step("close camera", async move {
            close.close_camera().map_err(anyhow::Error::from)
        })
        .run()
        .await;

    let schedule_result = match finished_early {
        Some(joined) => joined?,
        None => schedule.await?,
    };

    if let Err(e) = &schedule_result {
        error!("Scheduler failed: {}", e);
    }
    schedule_result?;
    shutdown?;

    info!("exit");
    Ok(())
}

/// A second signal during shutdown exits immediately.
fn spawn_force_exit(signals: &SignalHandler) {
    let mut rx = signals.subscribe();
    tokio::spawn(async move {
        while let Ok(signal) = rx.recv().await {
            if signal == DaemonSignal::Terminate {
                warn!("Second interrupt received, exiting without cleanup");
                std::process::exit(130);
            }
        }
    });
}
