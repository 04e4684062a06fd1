//! Reporting sink used by the worker and the detector.
//!
//! Components always hold a sink. When no reporting is wanted they get
//! [`NoopLogSink`] instead of an optional logger.

use std::fmt;

use tracing::{debug, error, info, warn};

/// Structured logging capability injected into the worker and detector.
pub trait LogSink: Send + Sync {
    fn debug(&self, args: fmt::Arguments<'_>);
    fn info(&self, args: fmt::Arguments<'_>);
    fn warn(&self, args: fmt::Arguments<'_>);
    fn error(&self, args: fmt::Arguments<'_>);
}

/// Sink that forwards to `tracing`, tagging each event with a component name.
#[derive(Debug, Clone)]
pub struct TracingLogSink {
    component: &'static str,
}

impl TracingLogSink {
    /// Create a sink for the given component.
    pub fn new(component: &'static str) -> Self {
        Self { component }
    }

    /// Component name attached to every event.
    pub fn component(&self) -> &'static str {
        self.component
    }
}

impl Default for TracingLogSink {
    fn default() -> Self {
        Self::new("gohome")
    }
}

impl LogSink for TracingLogSink {
    fn debug(&self, args: fmt::Arguments<'_>) {
        debug!(component = self.component, "{}", args);
    }

    fn info(&self, args: fmt::Arguments<'_>) {
        info!(component = self.component, "{}", args);
    }

    fn warn(&self, args: fmt::Arguments<'_>) {
        warn!(component = self.component, "{}", args);
    }

    fn error(&self, args: fmt::Arguments<'_>) {
        error!(component = self.component, "{}", args);
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogSink;

impl LogSink for NoopLogSink {
    fn debug(&self, _args: fmt::Arguments<'_>) {}
    fn info(&self, _args: fmt::Arguments<'_>) {}
    fn warn(&self, _args: fmt::Arguments<'_>) {}
    fn error(&self, _args: fmt::Arguments<'_>) {}
}
