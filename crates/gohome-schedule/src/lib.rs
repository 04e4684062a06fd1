//! # gohome Schedule
//!
//! Job worker for the gohome detector.
//!
//! ## Features
//!
//! - Fixed-interval and cron-style job triggers
//! - Job registry with lookup by id or name
//! - Per-job execution stats (last run, last error, tags)
//! - Self-reporting `stats` job that logs a snapshot every minute
//! - Cooperative stop via a cancellation token
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use gohome_schedule::{JobOptions, JobTrigger, Worker, WorkerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let worker = Arc::new(Worker::new(WorkerConfig::default())?);
//!
//!     worker.new_job(
//!         JobTrigger::Interval(Duration::from_secs(5)),
//!         || {
//!             println!("tick");
//!             Ok(())
//!         },
//!         JobOptions::new().with_name("ticker"),
//!     )?;
//!
//!     let runner = worker.clone();
//!     tokio::spawn(async move { runner.run().await });
//!
//!     tokio::time::sleep(Duration::from_secs(12)).await;
//!     worker.stop().await?;
//!     Ok(())
//! }
//! ```

mod engine;
pub mod error;
pub mod job;
pub mod log;
pub mod stats;
pub mod worker;

pub use error::{ScheduleError, ScheduleResult};
pub use job::{Job, JobOptions, JobTask, JobTrigger};
pub use log::{LogSink, NoopLogSink, TracingLogSink};
pub use stats::JobStats;
pub use worker::{Worker, WorkerConfig, STATS_JOB_NAME};

// Re-export CancellationToken for convenience
pub use tokio_util::sync::CancellationToken;
