//! # gohome daemon
//!
//! Process lifecycle for the long-running `gohome` modes: OS signals are
//! turned into a shutdown request, and a [`ShutdownSequence`] tears the
//! worker and camera down in order.

pub mod error;
pub mod shutdown;
pub mod signal;

pub use error::DaemonError;
pub use shutdown::ShutdownSequence;
pub use signal::{DaemonSignal, SignalHandler};
