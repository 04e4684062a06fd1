//! Worker: job registry plus the blocking scheduling loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::engine::Engine;
use crate::error::{ScheduleError, ScheduleResult};
use crate::job::{Job, JobOptions, JobTrigger};
use crate::log::{LogSink, NoopLogSink};
use crate::stats::JobStats;

const LOG_TAG: &str = "scheduler";

/// Name and tag of the internal reporting job.
pub const STATS_JOB_NAME: &str = "stats";

/// Worker configuration.
#[derive(Clone)]
pub struct WorkerConfig {
    /// How often `run` checks for a stop request.
    pub poll_interval: Duration,

    /// Cron expression of the internal stats job.
    pub stats_schedule: String,

    /// How long `stop` waits for in-flight jobs.
    pub shutdown_timeout: Duration,

    /// Reporting sink.
    pub logger: Arc<dyn LogSink>,
}

impl WorkerConfig {
    /// Set the reporting sink.
    pub fn with_logger(mut self, logger: Arc<dyn LogSink>) -> Self {
        self.logger = logger;
        self
    }

    /// Set the stop poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the stats job schedule.
    pub fn with_stats_schedule(mut self, expr: impl Into<String>) -> Self {
        self.stats_schedule = expr.into();
        self
    }

    /// Set the shutdown deadline.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            stats_schedule: "0 * * * * *".to_string(),
            shutdown_timeout: Duration::from_secs(10),
            logger: Arc::new(NoopLogSink),
        }
    }
}

impl std::fmt::Debug for WorkerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerConfig")
            .field("poll_interval", &self.poll_interval)
            .field("stats_schedule", &self.stats_schedule)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish_non_exhaustive()
    }
}

/// Owns a set of jobs and drives them until stopped.
///
/// Share it as `Arc<Worker>`: one task awaits [`Worker::run`] while another
/// (typically a signal handler) calls [`Worker::stop`].
pub struct Worker {
    jobs: RwLock<Vec<Arc<Job>>>,
    engine: Engine,
    poll_interval: Duration,
    stats_schedule: String,
    started_at: Mutex<Option<(DateTime<Utc>, Instant)>>,
    stop: CancellationToken,
    running: AtomicBool,
    logger: Arc<dyn LogSink>,
}

impl Worker {
    /// Create a worker.
    ///
    /// Fails if the poll interval is zero or the stats schedule is not a
    /// valid cron expression.
    pub fn new(config: WorkerConfig) -> ScheduleResult<Self> {
        if config.poll_interval.is_zero() {
            return Err(ScheduleError::InvalidConfig(
                "poll_interval must be greater than 0".to_string(),
            ));
        }
        JobTrigger::cron(config.stats_schedule.clone())
            .compile()
            .map_err(|e| ScheduleError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            jobs: RwLock::new(Vec::new()),
            engine: Engine::new(config.shutdown_timeout, config.logger.clone()),
            poll_interval: config.poll_interval,
            stats_schedule: config.stats_schedule,
            started_at: Mutex::new(None),
            stop: CancellationToken::new(),
            running: AtomicBool::new(false),
            logger: config.logger,
        })
    }

    /// Register a job.
    ///
    /// If the worker is already running the job is armed immediately,
    /// otherwise when `run` starts the engine.
    pub fn new_job<F>(
        &self,
        trigger: JobTrigger,
        task: F,
        options: JobOptions,
    ) -> ScheduleResult<Arc<Job>>
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let job = Arc::new(Job::new(trigger, Arc::new(task), options)?);
        self.jobs.write().push(job.clone());
        self.engine.arm(job.clone());

        self.logger.debug(format_args!(
            "[{}] registered job {} ({}) {}",
            LOG_TAG,
            job.name(),
            job.id(),
            job.trigger()
        ));
        Ok(job)
    }

    /// Find a job by id.
    pub fn find_job_by_id(&self, id: Uuid) -> Option<Arc<Job>> {
        self.jobs.read().iter().find(|job| job.id() == id).cloned()
    }

    /// Find the first job with the given name.
    pub fn find_job_by_name(&self, name: &str) -> Option<Arc<Job>> {
        self.jobs.read().iter().find(|job| job.name() == name).cloned()
    }

    /// All registered jobs.
    pub fn jobs(&self) -> Vec<Arc<Job>> {
        self.jobs.read().clone()
    }

    /// Detach a job and cancel its schedule.
    pub fn remove_job(&self, id: Uuid) -> ScheduleResult<()> {
        let removed = {
            let mut jobs = self.jobs.write();
            let index = jobs
                .iter()
                .position(|job| job.id() == id)
                .ok_or(ScheduleError::JobNotFound(id))?;
            jobs.remove(index)
        };
        removed.disarm();

        self.logger.debug(format_args!(
            "[{}] removed job {} ({})",
            LOG_TAG,
            removed.name(),
            id
        ));
        Ok(())
    }

    /// Fire a job once right now, outside its schedule.
    pub fn run_job_now(&self, id: Uuid) -> ScheduleResult<()> {
        let job = self.find_job_by_id(id).ok_or(ScheduleError::JobNotFound(id))?;
        self.engine.fire_now(job)
    }

    /// Snapshot of every registered job.
    pub fn stats(&self) -> Vec<JobStats> {
        self.jobs.read().iter().map(|job| job.stats()).collect()
    }

    /// Whether `run` is currently active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Time `run` started the engine, if it has.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at.lock().map(|(at, _)| at)
    }

    /// Run the scheduling loop until [`Worker::stop`] is called.
    ///
    /// Registers the `stats` job, starts the engine, reports stats once and
    /// then checks the stop token every poll interval.
    pub async fn run(self: Arc<Self>) -> ScheduleResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ScheduleError::AlreadyRunning);
        }
        let result = self.run_loop().await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn run_loop(self: &Arc<Self>) -> ScheduleResult<()> {
        if self.stop.is_cancelled() {
            self.logger
                .info(format_args!("[{}] Stop requested before start", LOG_TAG));
            return Ok(());
        }

        let stats_job = self.stats_job()?;
        self.engine.start(&self.jobs)?;

        let started = Utc::now();
        *self.started_at.lock() = Some((started, Instant::now()));
        self.logger
            .info(format_args!("[{}] Start... {}", LOG_TAG, started.to_rfc3339()));

        if let Err(e) = self.engine.fire_now(stats_job) {
            self.logger.error(format_args!("[{}] {}", LOG_TAG, e));
        }

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.stop.cancelled() => break,
                _ = ticker.tick() => {}
            }
        }

        self.logger.info(format_args!("[{}] Stop", LOG_TAG));

        // Either drains the engine (a stop() that raced ahead of engine
        // start) or waits for the drain stop() owns; both see the same outcome.
        if let Err(e) = self.engine.shutdown().await {
            self.logger.error(format_args!("[{}] {}", LOG_TAG, e));
        }
        Ok(())
    }

    /// Request the loop to stop and shut down the engine.
    ///
    /// Safe to call before, during or after `run`, and more than once. Jobs
    /// already executing run to completion (bounded by the shutdown timeout).
    /// A timed-out drain is reported here even when the run loop started it.
    pub async fn stop(&self) -> ScheduleResult<()> {
        self.stop.cancel();
        self.engine.shutdown().await
    }

    /// Token cancelled by [`Worker::stop`].
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    fn stats_job(self: &Arc<Self>) -> ScheduleResult<Arc<Job>> {
        if let Some(job) = self
            .jobs
            .read()
            .iter()
            .find(|job| job.name() == STATS_JOB_NAME && job.tags().iter().any(|t| t == STATS_JOB_NAME))
        {
            return Ok(job.clone());
        }

        let worker: Weak<Worker> = Arc::downgrade(self);
        self.new_job(
            JobTrigger::cron(self.stats_schedule.clone()),
            move || {
                if let Some(worker) = worker.upgrade() {
                    worker.report_stats();
                }
                Ok(())
            },
            JobOptions::new()
                .with_name(STATS_JOB_NAME)
                .with_tag(STATS_JOB_NAME),
        )
    }

    /// Log runtime and one JSON line per job.
    fn report_stats(&self) {
        let elapsed = self
            .started_at
            .lock()
            .map(|(_, at)| at.elapsed())
            .unwrap_or_default();
        self.logger.info(format_args!(
            "[{}] running time: {:.6} sec",
            LOG_TAG,
            elapsed.as_secs_f64()
        ));

        for stats in self.stats() {
            match stats.marshal() {
                Ok(line) => self.logger.info(format_args!("[{}] {}", LOG_TAG, line)),
                Err(e) => self
                    .logger
                    .warn(format_args!("[{}] error: {}", LOG_TAG, e)),
            }
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("jobs", &self.jobs.read().len())
            .field("poll_interval", &self.poll_interval)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
