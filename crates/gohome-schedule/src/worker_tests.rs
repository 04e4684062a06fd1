//! Tests for the worker.

use super::*;
use std::fmt;
use std::sync::atomic::AtomicU32;

#[derive(Default)]
struct RecordingSink {
    lines: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|line| line.contains(needle))
    }
}

impl LogSink for RecordingSink {
    fn debug(&self, _args: fmt::Arguments<'_>) {}
    fn info(&self, args: fmt::Arguments<'_>) {
        self.lines.lock().push(args.to_string());
    }
    fn warn(&self, args: fmt::Arguments<'_>) {
        self.lines.lock().push(args.to_string());
    }
    fn error(&self, args: fmt::Arguments<'_>) {
        self.lines.lock().push(args.to_string());
    }
}

fn fast_config() -> WorkerConfig {
    WorkerConfig::default().with_poll_interval(Duration::from_millis(50))
}

#[test]
fn test_worker_new_default() {
    let worker = Worker::new(WorkerConfig::default()).unwrap();
    assert!(worker.jobs().is_empty());
    assert!(!worker.is_running());
    assert!(worker.started_at().is_none());
}

#[test]
fn test_worker_rejects_zero_poll_interval() {
    let result = Worker::new(WorkerConfig::default().with_poll_interval(Duration::ZERO));
    assert!(matches!(result, Err(ScheduleError::InvalidConfig(_))));
}

#[test]
fn test_worker_rejects_bad_stats_schedule() {
    let result = Worker::new(WorkerConfig::default().with_stats_schedule("every minute"));
    assert!(matches!(result, Err(ScheduleError::InvalidConfig(_))));
}

#[test]
fn test_new_job_rejects_malformed_triggers() {
    let worker = Worker::new(WorkerConfig::default()).unwrap();

    let zero = worker.new_job(
        JobTrigger::Interval(Duration::ZERO),
        || Ok(()),
        JobOptions::new(),
    );
    assert!(matches!(zero, Err(ScheduleError::InvalidInterval(_))));

    let cron = worker.new_job(JobTrigger::cron("61 * * * *"), || Ok(()), JobOptions::new());
    assert!(matches!(cron, Err(ScheduleError::InvalidCron { .. })));

    assert!(worker.jobs().is_empty());
}

#[test]
fn test_find_job_by_id() {
    let worker = Worker::new(WorkerConfig::default()).unwrap();
    let job = worker
        .new_job(JobTrigger::every_secs(1), || Ok(()), JobOptions::new().with_name("a"))
        .unwrap();
    worker
        .new_job(JobTrigger::every_secs(1), || Ok(()), JobOptions::new().with_name("b"))
        .unwrap();

    let found = worker.find_job_by_id(job.id()).unwrap();
    assert!(Arc::ptr_eq(&found, &job));
    assert!(worker.find_job_by_id(Uuid::new_v4()).is_none());
}

#[test]
fn test_find_job_by_name_returns_first_match() {
    let worker = Worker::new(WorkerConfig::default()).unwrap();
    let first = worker
        .new_job(JobTrigger::every_secs(1), || Ok(()), JobOptions::new().with_name("dup"))
        .unwrap();
    worker
        .new_job(JobTrigger::every_secs(2), || Ok(()), JobOptions::new().with_name("dup"))
        .unwrap();

    let found = worker.find_job_by_name("dup").unwrap();
    assert_eq!(found.id(), first.id());
    assert!(worker.find_job_by_name("missing").is_none());
}

#[test]
fn test_stats_one_entry_per_job_and_remove() {
    let worker = Worker::new(WorkerConfig::default()).unwrap();
    let a = worker
        .new_job(JobTrigger::every_secs(1), || Ok(()), JobOptions::new().with_name("a"))
        .unwrap();
    let b = worker
        .new_job(JobTrigger::cron("* * * * *"), || Ok(()), JobOptions::new().with_name("b"))
        .unwrap();

    let stats = worker.stats();
    assert_eq!(stats.len(), 2);
    assert!(stats.iter().any(|s| s.id == a.id()));
    assert!(stats.iter().any(|s| s.id == b.id()));

    worker.remove_job(a.id()).unwrap();
    let stats = worker.stats();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].id, b.id());
}

#[test]
fn test_remove_unknown_job() {
    let worker = Worker::new(WorkerConfig::default()).unwrap();
    let id = Uuid::new_v4();
    assert!(matches!(worker.remove_job(id), Err(ScheduleError::JobNotFound(found)) if found == id));
}

#[test]
fn test_run_job_now_requires_running_engine() {
    let worker = Worker::new(WorkerConfig::default()).unwrap();
    let job = worker
        .new_job(JobTrigger::every_secs(60), || Ok(()), JobOptions::new())
        .unwrap();
    assert!(matches!(worker.run_job_now(job.id()), Err(ScheduleError::NotRunning)));
}

#[tokio::test]
async fn test_stop_before_run_returns_promptly() {
    let worker = Arc::new(Worker::new(fast_config()).unwrap());
    worker.stop().await.unwrap();

    tokio::time::timeout(Duration::from_secs(1), worker.clone().run())
        .await
        .expect("run should return when already stopped")
        .unwrap();

    assert!(worker.find_job_by_name(STATS_JOB_NAME).is_none());
}

#[tokio::test]
async fn test_run_registers_and_fires_stats_job() {
    let sink = Arc::new(RecordingSink::default());
    let worker = Arc::new(Worker::new(fast_config().with_logger(sink.clone())).unwrap());

    let handle = tokio::spawn(worker.clone().run());
    tokio::time::sleep(Duration::from_millis(300)).await;

    let stats_job = worker.find_job_by_name(STATS_JOB_NAME).expect("stats job registered");
    assert_eq!(stats_job.tags(), ["stats"]);
    assert!(stats_job.run_count() >= 1);
    assert!(worker.is_running());
    assert!(worker.started_at().is_some());

    worker.stop().await.unwrap();
    handle.await.unwrap().unwrap();

    assert!(sink.contains("[scheduler] Start..."));
    assert!(sink.contains("running time:"));
    assert!(sink.contains("\"name\":\"stats\""));
    assert!(sink.contains("[scheduler] Stop"));
    assert!(!worker.is_running());
}

#[tokio::test]
async fn test_run_twice_concurrently_is_rejected() {
    let worker = Arc::new(Worker::new(fast_config()).unwrap());
    let handle = tokio::spawn(worker.clone().run());
    tokio::time::sleep(Duration::from_millis(100)).await;

    let second = worker.clone().run().await;
    assert!(matches!(second, Err(ScheduleError::AlreadyRunning)));

    worker.stop().await.unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_job_added_while_running_fires() {
    let worker = Arc::new(Worker::new(fast_config()).unwrap());
    let handle = tokio::spawn(worker.clone().run());
    tokio::time::sleep(Duration::from_millis(100)).await;

    let counter = Arc::new(AtomicU32::new(0));
    let c = counter.clone();
    worker
        .new_job(
            JobTrigger::Interval(Duration::from_millis(100)),
            move || {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            JobOptions::new(),
        )
        .unwrap();

    tokio::time::sleep(Duration::from_millis(450)).await;
    worker.stop().await.unwrap();
    handle.await.unwrap().unwrap();

    assert!(counter.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn test_removed_job_stops_firing() {
    let worker = Arc::new(Worker::new(fast_config()).unwrap());
    let counter = Arc::new(AtomicU32::new(0));
    let c = counter.clone();
    let job = worker
        .new_job(
            JobTrigger::Interval(Duration::from_millis(50)),
            move || {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            JobOptions::new(),
        )
        .unwrap();

    let handle = tokio::spawn(worker.clone().run());
    tokio::time::sleep(Duration::from_millis(200)).await;
    worker.remove_job(job.id()).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let after_remove = counter.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(after_remove >= 1);
    assert_eq!(counter.load(Ordering::SeqCst), after_remove);

    worker.stop().await.unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_failing_job_records_last_error() {
    let worker = Arc::new(Worker::new(fast_config()).unwrap());
    let job = worker
        .new_job(
            JobTrigger::Interval(Duration::from_millis(50)),
            || Err(anyhow::anyhow!("cannot read device")),
            JobOptions::new().with_name("Detector"),
        )
        .unwrap();

    let handle = tokio::spawn(worker.clone().run());
    tokio::time::sleep(Duration::from_millis(200)).await;
    worker.stop().await.unwrap();
    handle.await.unwrap().unwrap();

    let stats = worker
        .stats()
        .into_iter()
        .find(|s| s.id == job.id())
        .unwrap();
    assert_eq!(stats.error.as_deref(), Some("cannot read device"));
    assert!(stats.last_run.is_some());
}

#[tokio::test]
async fn test_run_job_now_while_running() {
    let worker = Arc::new(Worker::new(fast_config()).unwrap());
    let job = worker
        .new_job(JobTrigger::every_secs(3600), || Ok(()), JobOptions::new())
        .unwrap();

    let handle = tokio::spawn(worker.clone().run());
    tokio::time::sleep(Duration::from_millis(100)).await;

    worker.run_job_now(job.id()).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(job.run_count(), 1);
    assert!(job.next_run().is_some());

    worker.stop().await.unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shutdown_timeout_surfaces() {
    let worker = Arc::new(
        Worker::new(fast_config().with_shutdown_timeout(Duration::from_millis(50))).unwrap(),
    );
    let job = worker
        .new_job(
            JobTrigger::every_secs(3600),
            || {
                std::thread::sleep(Duration::from_millis(400));
                Ok(())
            },
            JobOptions::new(),
        )
        .unwrap();

    let handle = tokio::spawn(worker.clone().run());
    tokio::time::sleep(Duration::from_millis(100)).await;
    worker.run_job_now(job.id()).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let result = worker.stop().await;
    assert!(matches!(result, Err(ScheduleError::ShutdownTimeout(_))));
    handle.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_reports_timeout_when_run_loop_drains_first() {
    for _ in 0..20 {
        let worker = Arc::new(
            Worker::new(fast_config().with_shutdown_timeout(Duration::from_millis(20))).unwrap(),
        );
        let job = worker
            .new_job(
                JobTrigger::every_secs(3600),
                || {
                    std::thread::sleep(Duration::from_millis(60));
                    Ok(())
                },
                JobOptions::new(),
            )
            .unwrap();

        let handle = tokio::spawn(worker.clone().run());
        tokio::time::sleep(Duration::from_millis(30)).await;
        worker.run_job_now(job.id()).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let result = worker.stop().await;
        assert!(matches!(result, Err(ScheduleError::ShutdownTimeout(_))));
        handle.await.unwrap().unwrap();

        // Later calls report the same drain.
        assert!(matches!(worker.stop().await, Err(ScheduleError::ShutdownTimeout(_))));
    }
}

#[tokio::test]
async fn test_run_job_now_does_not_overlap_scheduled_execution() {
    let worker = Arc::new(Worker::new(fast_config()).unwrap());
    let active = Arc::new(AtomicU32::new(0));
    let peak = Arc::new(AtomicU32::new(0));
    let (a, p) = (active.clone(), peak.clone());
    let job = worker
        .new_job(
            JobTrigger::Interval(Duration::from_millis(100)),
            move || {
                let now = a.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(300));
                a.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            },
            JobOptions::new(),
        )
        .unwrap();

    let handle = tokio::spawn(worker.clone().run());
    tokio::time::sleep(Duration::from_millis(180)).await;
    assert!(job.is_executing());
    worker.run_job_now(job.id()).unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    worker.stop().await.unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(peak.load(Ordering::SeqCst), 1);
}
