//! Ordered graceful shutdown.

use std::future::Future;
use std::pin::Pin;

use tracing::{error, info};

use crate::error::DaemonError;

type StepFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// Named async steps run one after another.
///
/// Every step runs even if an earlier one failed; the first failure is
/// returned.
#[derive(Default)]
pub struct ShutdownSequence {
    steps: Vec<(String, StepFuture)>,
}

impl ShutdownSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step.
    pub fn step<F>(mut self, name: impl Into<String>, step: F) -> Self
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.steps.push((name.into(), Box::pin(step)));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub async fn run(self) -> Result<(), DaemonError> {
        let mut first_failure = None;

        for (name, step) in self.steps {
            match step.await {
                Ok(()) => info!("Shutdown step '{}' done", name),
                Err(e) => {
                    error!("Shutdown step '{}' failed: {:#}", name, e);
                    if first_failure.is_none() {
                        first_failure = Some(DaemonError::ShutdownStep {
                            step: name,
                            message: format!("{:#}", e),
                        });
                    }
                }
            }
        }

        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for ShutdownSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.steps.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("ShutdownSequence")
            .field("steps", &names)
            .finish()
    }
}
