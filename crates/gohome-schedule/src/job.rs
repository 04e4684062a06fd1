//! Job definition, trigger rules and per-job execution state.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ScheduleError, ScheduleResult};
use crate::stats::JobStats;

/// Unit of work attached to a job.
pub type JobTask = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// When a job fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobTrigger {
    /// Fire repeatedly, at least this far apart.
    Interval(Duration),
    /// Fire on calendar boundaries matching a cron expression.
    ///
    /// Accepts 5-field crontab syntax (seconds default to `0`) or the
    /// 6/7-field `second minute hour day month weekday [year]` form.
    Cron(String),
}

impl JobTrigger {
    /// Interval trigger in whole seconds.
    pub fn every_secs(secs: u64) -> Self {
        JobTrigger::Interval(Duration::from_secs(secs))
    }

    /// Cron trigger.
    pub fn cron(expr: impl Into<String>) -> Self {
        JobTrigger::Cron(expr.into())
    }

    /// Check the trigger without registering it.
    pub fn validate(&self) -> ScheduleResult<()> {
        self.compile().map(|_| ())
    }

    /// Validate the trigger and build its cadence.
    pub(crate) fn compile(&self) -> ScheduleResult<Cadence> {
        match self {
            JobTrigger::Interval(period) => {
                if period.is_zero() {
                    return Err(ScheduleError::InvalidInterval(*period));
                }
                Ok(Cadence::Interval(*period))
            }
            JobTrigger::Cron(expr) => {
                let normalized = normalize_cron(expr);
                let schedule =
                    Schedule::from_str(&normalized).map_err(|e| ScheduleError::InvalidCron {
                        expr: expr.clone(),
                        message: e.to_string(),
                    })?;
                Ok(Cadence::Cron(Box::new(schedule)))
            }
        }
    }
}

impl fmt::Display for JobTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobTrigger::Interval(period) => write!(f, "every {:?}", period),
            JobTrigger::Cron(expr) => write!(f, "cron '{}'", expr),
        }
    }
}

/// Expand a 5-field crontab expression to the 6-field form with seconds.
pub fn normalize_cron(expr: &str) -> String {
    let trimmed = expr.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {}", trimmed)
    } else {
        trimmed.to_string()
    }
}

/// Compiled trigger.
pub(crate) enum Cadence {
    Interval(Duration),
    Cron(Box<Schedule>),
}

impl Cadence {
    /// Next cron boundary strictly after `after`.
    pub(crate) fn next_cron_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Cadence::Cron(schedule) => schedule.after(&after).next(),
            Cadence::Interval(_) => None,
        }
    }
}

/// Name and tags attached at registration.
#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    pub name: Option<String>,
    pub tags: Vec<String>,
}

impl JobOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the job name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a single tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Add several tags.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

#[derive(Debug, Clone, Default)]
struct JobState {
    last_run: Option<DateTime<Utc>>,
    last_error: Option<String>,
    run_count: u64,
    next_run: Option<DateTime<Utc>>,
}

/// A registered, schedulable unit of work.
pub struct Job {
    id: Uuid,
    name: String,
    tags: Vec<String>,
    trigger: JobTrigger,
    cadence: Cadence,
    task: JobTask,
    state: Mutex<JobState>,
    /// Token of the driver currently scheduling this job.
    armed: Mutex<Option<CancellationToken>>,
    executing: AtomicBool,
}

impl Job {
    /// Build a job. Fails if the trigger is malformed.
    pub(crate) fn new(trigger: JobTrigger, task: JobTask, options: JobOptions) -> ScheduleResult<Self> {
        let cadence = trigger.compile()?;
        let id = Uuid::new_v4();
        let name = options.name.unwrap_or_else(|| id.to_string());

        Ok(Self {
            id,
            name,
            tags: options.tags,
            trigger,
            cadence,
            task,
            state: Mutex::new(JobState::default()),
            armed: Mutex::new(None),
            executing: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn trigger(&self) -> &JobTrigger {
        &self.trigger
    }

    /// Start time of the most recent execution.
    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        self.state.lock().last_run
    }

    /// Error of the most recent execution, if it failed.
    pub fn last_error(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }

    pub fn run_count(&self) -> u64 {
        self.state.lock().run_count
    }

    /// Next time the engine plans to fire this job.
    pub fn next_run(&self) -> Option<DateTime<Utc>> {
        self.state.lock().next_run
    }

    /// Consistent snapshot of this job's history.
    pub fn stats(&self) -> JobStats {
        let state = self.state.lock();
        JobStats {
            id: self.id,
            name: self.name.clone(),
            error: state.last_error.clone(),
            last_run: state.last_run,
            run_count: state.run_count,
            tags: self.tags.clone(),
        }
    }

    /// Whether an execution of this job is in progress.
    pub fn is_executing(&self) -> bool {
        self.executing.load(Ordering::SeqCst)
    }

    /// Claim the job for one execution. `None` if one is already in progress.
    pub(crate) fn begin_execution(self: &Arc<Self>) -> Option<Execution> {
        if self.executing.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(Execution(self.clone()))
    }

    pub(crate) fn cadence(&self) -> &Cadence {
        &self.cadence
    }

    pub(crate) fn set_next_run(&self, next: Option<DateTime<Utc>>) {
        self.state.lock().next_run = next;
    }

    /// Run the task on the current thread and record the outcome.
    pub(crate) fn run_task(&self) -> anyhow::Result<()> {
        let started_at = Utc::now();
        let result = (self.task)();
        let mut state = self.state.lock();
        state.last_run = Some(started_at);
        state.run_count += 1;
        state.last_error = result.as_ref().err().map(|e| format!("{:#}", e));
        result
    }

    /// Record an execution that never returned (panicked task).
    pub(crate) fn record_abort(&self, message: impl Into<String>) {
        let mut state = self.state.lock();
        state.last_run = Some(Utc::now());
        state.run_count += 1;
        state.last_error = Some(message.into());
    }

    /// Attach a driver token. Returns false if a live driver already owns the job.
    pub(crate) fn arm(&self, token: CancellationToken) -> bool {
        let mut armed = self.armed.lock();
        if armed.as_ref().is_some_and(|t| !t.is_cancelled()) {
            return false;
        }
        *armed = Some(token);
        true
    }

    /// Cancel the driver scheduling this job, if any.
    pub(crate) fn disarm(&self) {
        if let Some(token) = self.armed.lock().take() {
            token.cancel();
        }
        self.set_next_run(None);
    }
}

/// Exclusive claim on a job's execution, released on drop.
pub(crate) struct Execution(Arc<Job>);

impl Execution {
    /// Run the task on the current thread and record the outcome.
    pub(crate) fn run(&self) -> anyhow::Result<()> {
        self.0.run_task()
    }
}

impl Drop for Execution {
    fn drop(&mut self) {
        self.0.executing.store(false, Ordering::SeqCst);
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("tags", &self.tags)
            .field("trigger", &self.trigger)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
