//! Signal handling.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::DaemonError;

/// Lifecycle signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonSignal {
    /// Graceful shutdown (SIGTERM, SIGINT).
    Shutdown,
    /// A second interrupt while shutting down.
    Terminate,
}

impl std::fmt::Display for DaemonSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DaemonSignal::Shutdown => write!(f, "SHUTDOWN"),
            DaemonSignal::Terminate => write!(f, "TERMINATE"),
        }
    }
}

/// Fans OS signals out to subscribers and remembers that shutdown was asked.
#[derive(Clone)]
pub struct SignalHandler {
    sender: broadcast::Sender<DaemonSignal>,
    shutdown_requested: Arc<AtomicBool>,
}

impl SignalHandler {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(16);
        Self {
            sender,
            shutdown_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DaemonSignal> {
        self.sender.subscribe()
    }

    /// Broadcast `signal`. Either variant marks shutdown as requested.
    pub fn send(&self, signal: DaemonSignal) {
        debug!("Broadcasting {}", signal);
        self.shutdown_requested.store(true, Ordering::SeqCst);
        let _ = self.sender.send(signal);
    }

    /// Request shutdown. A repeated request escalates to `Terminate`.
    pub fn request_shutdown(&self) {
        if self.is_shutdown_requested() {
            self.send(DaemonSignal::Terminate);
        } else {
            self.send(DaemonSignal::Shutdown);
        }
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    /// Resolve once shutdown has been requested.
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.subscribe();
        if self.is_shutdown_requested() {
            return;
        }
        loop {
            match rx.recv().await {
                Ok(_) => return,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }

    /// Install SIGTERM and SIGINT handlers (Unix).
    #[cfg(unix)]
    pub fn setup_os_signals(&self) -> Result<(), DaemonError> {
        use tokio::signal::unix::SignalKind;

        self.forward(SignalKind::terminate(), "SIGTERM")?;
        self.forward(SignalKind::interrupt(), "SIGINT")?;
        info!("Listening for SIGTERM and SIGINT");
        Ok(())
    }

    /// Turn every delivery of `kind` into a shutdown request.
    #[cfg(unix)]
    fn forward(
        &self,
        kind: tokio::signal::unix::SignalKind,
        name: &'static str,
    ) -> Result<(), DaemonError> {
        let mut stream = tokio::signal::unix::signal(kind)
            .map_err(|e| DaemonError::SignalSetup(format!("{}: {}", name, e)))?;
        let handler = self.clone();
        tokio::spawn(async move {
            while stream.recv().await.is_some() {
                info!("Received {}", name);
                handler.request_shutdown();
            }
        });
        Ok(())
    }

    /// Install a Ctrl+C handler (non-Unix).
    #[cfg(not(unix))]
    pub fn setup_os_signals(&self) -> Result<(), DaemonError> {
        use tracing::warn;

        let handler = self.clone();
        tokio::spawn(async move {
            loop {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        info!("Received Ctrl+C");
                        handler.request_shutdown();
                    }
                    Err(e) => {
                        warn!("Ctrl+C handler failed: {}", e);
                        return;
                    }
                }
            }
        });

        info!("Listening for Ctrl+C");
        Ok(())
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SignalHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalHandler")
            .field("shutdown_requested", &self.is_shutdown_requested())
            .finish()
    }
}

#[cfg(test)]
#[path = "signal_tests.rs"]
mod tests;
