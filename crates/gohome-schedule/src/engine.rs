//! Scheduling engine: one driver task per armed job.
//!
//! Each driver sleeps until the job is due, runs the task on the blocking
//! pool and only then computes the next fire time, so a job never overlaps
//! itself.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ScheduleError, ScheduleResult};
use crate::job::{Cadence, Job};
use crate::log::LogSink;

/// Outcome of draining the engine; `Err` carries the timeout that expired.
type Drain = Result<(), Duration>;

enum EngineState {
    Idle,
    Running {
        handle: Handle,
        token: CancellationToken,
        tasks: JoinSet<()>,
    },
    /// One caller is draining; the others wait for its outcome.
    Stopping(watch::Receiver<Option<Drain>>),
    Stopped(Drain),
}

/// What a `shutdown` caller has to do.
enum Shutdown {
    Drain {
        token: CancellationToken,
        tasks: JoinSet<()>,
        done: watch::Sender<Option<Drain>>,
    },
    Wait(watch::Receiver<Option<Drain>>),
    Done(Drain),
}

pub(crate) struct Engine {
    state: Mutex<EngineState>,
    shutdown_timeout: Duration,
    logger: Arc<dyn LogSink>,
}

impl Engine {
    pub(crate) fn new(shutdown_timeout: Duration, logger: Arc<dyn LogSink>) -> Self {
        Self {
            state: Mutex::new(EngineState::Idle),
            shutdown_timeout,
            logger,
        }
    }

    /// Start the engine on the current tokio runtime and arm every registered job.
    pub(crate) fn start(&self, jobs: &RwLock<Vec<Arc<Job>>>) -> ScheduleResult<()> {
        let handle = Handle::try_current().map_err(|_| ScheduleError::NotRunning)?;
        let mut state = self.state.lock();
        if matches!(*state, EngineState::Running { .. } | EngineState::Stopping(_)) {
            return Err(ScheduleError::AlreadyRunning);
        }

        let token = CancellationToken::new();
        let mut tasks = JoinSet::new();
        for job in jobs.read().iter() {
            spawn_driver(&mut tasks, &handle, &token, job.clone(), self.logger.clone());
        }
        debug!("Scheduler engine started with {} jobs", tasks.len());

        *state = EngineState::Running {
            handle,
            token,
            tasks,
        };
        Ok(())
    }

    /// Arm a job registered after start. No-op while idle.
    pub(crate) fn arm(&self, job: Arc<Job>) {
        let mut state = self.state.lock();
        if let EngineState::Running {
            handle,
            token,
            tasks,
        } = &mut *state
        {
            spawn_driver(tasks, handle, token, job, self.logger.clone());
        }
    }

    /// Execute a job once, outside its schedule. Skipped if the job is
    /// already executing.
    pub(crate) fn fire_now(&self, job: Arc<Job>) -> ScheduleResult<()> {
        let mut state = self.state.lock();
        match &mut *state {
            EngineState::Running { handle, tasks, .. } => {
                while tasks.try_join_next().is_some() {}
                tasks.spawn_on(execute(job, self.logger.clone()), handle);
                Ok(())
            }
            _ => Err(ScheduleError::NotRunning),
        }
    }

    /// Cancel every driver and wait for in-flight executions.
    ///
    /// Concurrent callers all observe the outcome of the single drain.
    pub(crate) async fn shutdown(&self) -> ScheduleResult<()> {
        let action = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, EngineState::Stopped(Ok(()))) {
                EngineState::Running { token, tasks, .. } => {
                    let (done, waiting) = watch::channel(None);
                    *state = EngineState::Stopping(waiting);
                    Shutdown::Drain { token, tasks, done }
                }
                EngineState::Stopping(waiting) => {
                    *state = EngineState::Stopping(waiting.clone());
                    Shutdown::Wait(waiting)
                }
                EngineState::Stopped(outcome) => {
                    *state = EngineState::Stopped(outcome);
                    Shutdown::Done(outcome)
                }
                EngineState::Idle => Shutdown::Done(Ok(())),
            }
        };

        let outcome = match action {
            Shutdown::Drain {
                token,
                mut tasks,
                done,
            } => {
                let outcome = self.drain(token, &mut tasks).await;
                *self.state.lock() = EngineState::Stopped(outcome);
                done.send_replace(Some(outcome));
                outcome
            }
            Shutdown::Wait(mut waiting) => match waiting.wait_for(Option::is_some).await {
                Ok(outcome) => (*outcome).unwrap_or(Ok(())),
                // The draining caller was dropped, and its JoinSet aborted the tasks.
                Err(_) => Ok(()),
            },
            Shutdown::Done(outcome) => outcome,
        };
        outcome.map_err(ScheduleError::ShutdownTimeout)
    }

    async fn drain(&self, token: CancellationToken, tasks: &mut JoinSet<()>) -> Drain {
        token.cancel();
        let drained = tokio::time::timeout(self.shutdown_timeout, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        match drained {
            Ok(()) => {
                debug!("Scheduler engine stopped");
                Ok(())
            }
            Err(_) => {
                tasks.abort_all();
                Err(self.shutdown_timeout)
            }
        }
    }
}

fn spawn_driver(
    tasks: &mut JoinSet<()>,
    handle: &Handle,
    engine_token: &CancellationToken,
    job: Arc<Job>,
    logger: Arc<dyn LogSink>,
) {
    let token = engine_token.child_token();
    if !job.arm(token.clone()) {
        return;
    }
    tasks.spawn_on(drive(job, token, logger), handle);
}

async fn drive(job: Arc<Job>, token: CancellationToken, logger: Arc<dyn LogSink>) {
    let mut last_fire = Instant::now();
    let mut last_boundary = None;

    loop {
        let delay = match job.cadence() {
            Cadence::Interval(period) => {
                let due = last_fire + *period;
                let wait = due.saturating_duration_since(Instant::now());
                job.set_next_run(chrono::Duration::from_std(wait).ok().map(|d| Utc::now() + d));
                wait
            }
            Cadence::Cron(_) => {
                let now = Utc::now();
                let from = last_boundary.map_or(now, |b| if b > now { b } else { now });
                match job.cadence().next_cron_after(from) {
                    Some(next) => {
                        job.set_next_run(Some(next));
                        last_boundary = Some(next);
                        (next - now).to_std().unwrap_or(Duration::ZERO)
                    }
                    None => {
                        debug!("Job {} has no upcoming schedule", job.id());
                        job.set_next_run(None);
                        return;
                    }
                }
            }
        };

        tokio::select! {
            _ = token.cancelled() => {
                debug!("Driver for job {} cancelled", job.id());
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        last_fire = Instant::now();
        execute(job.clone(), logger.clone()).await;
    }
}

async fn execute(job: Arc<Job>, logger: Arc<dyn LogSink>) {
    let Some(execution) = job.begin_execution() else {
        logger.warn(format_args!(
            "job {} ({}) still running, skipping this fire",
            job.name(),
            job.id()
        ));
        return;
    };
    match tokio::task::spawn_blocking(move || execution.run()).await {
        Ok(Ok(())) => {
            logger.debug(format_args!("job {} ({}) completed", job.name(), job.id()));
        }
        Ok(Err(e)) => {
            logger.error(format_args!("job {} ({}) failed: {:#}", job.name(), job.id(), e));
        }
        Err(e) => {
            job.record_abort(format!("task aborted: {}", e));
            logger.error(format_args!("job {} ({}) aborted: {}", job.name(), job.id(), e));
        }
    }
}
