//! Task registry, priority queues and the beat loop.

use async_trait::async_trait;
use chrono::{DateTime, DurationRound, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

use crate::config::JobsConfig;
use crate::jobs::schedule::{JobSpec, Queue};

/// A unit of background work.
#[async_trait]
pub trait Task: Send + Sync {
    fn name(&self) -> &str;

    /// Retries after a failed run.
    fn max_retries(&self) -> u32 {
        0
    }

    async fn run(&self) -> Result<Value, String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Beat,
    Manual,
}

/// A queued task invocation.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: String,
    pub task: String,
    pub queue: Queue,
    pub trigger: Trigger,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("task '{0}' is not registered")]
    UnknownTask(String),

    #[error("queue '{0}' is full")]
    QueueFull(Queue),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    Failed,
    TimedOut,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Success => "success",
            RunOutcome::Failed => "failed",
            RunOutcome::TimedOut => "timed_out",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskRunInfo {
    pub runs: u64,
    pub failures: u64,
    pub last_outcome: Option<RunOutcome>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
    pub last_error: Option<String>,
    pub last_result: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleEntry {
    pub name: String,
    pub task: String,
    pub queue: Queue,
    pub registered: bool,
    pub next_run: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStats {
    pub enabled: bool,
    pub registered_tasks: Vec<String>,
    pub queued: BTreeMap<Queue, usize>,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub tasks: BTreeMap<String, TaskRunInfo>,
    pub schedule: Vec<ScheduleEntry>,
}

#[derive(Default)]
struct Counters {
    running: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
}

/// Holds tasks and queued jobs, and runs the periodic beat.
pub struct JobScheduler {
    config: JobsConfig,
    tasks: RwLock<HashMap<String, Arc<dyn Task>>>,
    queues: [Mutex<VecDeque<Job>>; 3],
    ready: Notify,
    counters: Counters,
    runs: Mutex<HashMap<String, TaskRunInfo>>,
    /// Last beat minute evaluated, as a unix timestamp.
    last_beat: Mutex<Option<i64>>,
    warned_missing: Mutex<HashSet<String>>,
}

impl JobScheduler {
    pub fn new(config: JobsConfig) -> Self {
        Self {
            config,
            tasks: RwLock::new(HashMap::new()),
            queues: Default::default(),
            ready: Notify::new(),
            counters: Counters::default(),
            runs: Mutex::new(HashMap::new()),
            last_beat: Mutex::new(None),
            warned_missing: Mutex::new(HashSet::new()),
        }
    }

    pub fn config(&self) -> &JobsConfig {
        &self.config
    }

    pub fn register(&self, task: Arc<dyn Task>) {
        let name = task.name().to_string();
        tracing::debug!(task = %name, "Task registered");
        self.tasks
            .write()
            .expect("task registry lock poisoned")
            .insert(name, task);
    }

    pub fn task(&self, name: &str) -> Option<Arc<dyn Task>> {
        self.tasks
            .read()
            .expect("task registry lock poisoned")
            .get(name)
            .cloned()
    }

    pub fn enqueue(&self, task: &str, queue: Queue) -> Result<Job, EnqueueError> {
        self.enqueue_with(task, queue, Trigger::Manual)
    }

    /// Queue a task on the queue its schedule entry names, medium otherwise.
    pub fn trigger(&self, task: &str) -> Result<Job, EnqueueError> {
        let queue = self
            .config
            .schedule
            .iter()
            .find(|spec| spec.task == task)
            .map(|spec| spec.queue)
            .unwrap_or_default();
        self.enqueue_with(task, queue, Trigger::Manual)
    }

    fn enqueue_with(&self, task: &str, queue: Queue, trigger: Trigger) -> Result<Job, EnqueueError> {
        if self.task(task).is_none() {
            return Err(EnqueueError::UnknownTask(task.to_string()));
        }
        let job = Job {
            id: uuid::Uuid::new_v4().to_string(),
            task: task.to_string(),
            queue,
            trigger,
            enqueued_at: Utc::now(),
        };
        {
            let mut q = self.queues[queue.index()]
                .lock()
                .expect("job queue mutex poisoned");
            if q.len() >= self.config.queue_capacity {
                tracing::warn!(task, queue = %queue, "Job queue full, dropping job");
                return Err(EnqueueError::QueueFull(queue));
            }
            q.push_back(job.clone());
        }
        tracing::debug!(job_id = %job.id, task, queue = %queue, "Job enqueued");
        self.ready.notify_one();
        Ok(job)
    }

    /// Next job, highest priority queue first.
    pub fn pop(&self) -> Option<Job> {
        self.queues.iter().find_map(|q| {
            q.lock().expect("job queue mutex poisoned").pop_front()
        })
    }

    pub(crate) async fn wait_for_job(&self) {
        self.ready.notified().await;
    }

    pub fn queued(&self) -> BTreeMap<Queue, usize> {
        Queue::ALL
            .iter()
            .map(|q| {
                (
                    *q,
                    self.queues[q.index()].lock().expect("job queue mutex poisoned").len(),
                )
            })
            .collect()
    }

    /// Enqueue every job due in the minute containing `now`. Each minute is
    /// evaluated once, however often this is called.
    pub fn beat_tick(&self, now: DateTime<Utc>) -> usize {
        let Ok(minute) = now.duration_trunc(chrono::Duration::minutes(1)) else {
            return 0;
        };
        {
            let mut last = self.last_beat.lock().expect("beat mutex poisoned");
            if *last == Some(minute.timestamp()) {
                return 0;
            }
            *last = Some(minute.timestamp());
        }

        let mut enqueued = 0;
        for spec in self.config.schedule.iter().filter(|s| s.schedule.matches(minute)) {
            if self.task(&spec.task).is_none() {
                self.warn_missing_once(spec);
                continue;
            }
            match self.enqueue_with(&spec.task, spec.queue, Trigger::Beat) {
                Ok(_) => enqueued += 1,
                Err(e) => tracing::warn!(job = %spec.name, error = %e, "Scheduled job not enqueued"),
            }
        }
        if enqueued > 0 {
            tracing::info!(enqueued, minute = %minute, "Beat enqueued scheduled jobs");
        }
        enqueued
    }

    fn warn_missing_once(&self, spec: &JobSpec) {
        let mut warned = self.warned_missing.lock().expect("warned set mutex poisoned");
        if warned.insert(spec.task.clone()) {
            tracing::warn!(job = %spec.name, task = %spec.task, "Scheduled task has no implementation, skipping");
        }
    }

    /// Beat loop until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Job scheduler disabled");
            return;
        }
        tracing::info!(entries = self.config.schedule.len(), "Job scheduler starting");
        let mut ticker = tokio::time::interval(Duration::from_secs(10));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.beat_tick(Utc::now());
                }
                _ = shutdown.recv() => {
                    tracing::info!("Job scheduler received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    pub(crate) fn run_started(&self) {
        self.counters.running.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn run_finished(
        &self,
        task: &str,
        outcome: RunOutcome,
        duration: Duration,
        result: Result<Value, String>,
    ) {
        self.counters.running.fetch_sub(1, Ordering::Relaxed);
        let counter = match outcome {
            RunOutcome::Success => &self.counters.completed,
            RunOutcome::Failed => &self.counters.failed,
            RunOutcome::TimedOut => &self.counters.timed_out,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        let mut runs = self.runs.lock().expect("run info mutex poisoned");
        let info = runs.entry(task.to_string()).or_default();
        info.runs += 1;
        if outcome != RunOutcome::Success {
            info.failures += 1;
        }
        info.last_outcome = Some(outcome);
        info.last_run_at = Some(Utc::now());
        info.last_duration_ms = Some(duration.as_millis() as u64);
        match result {
            Ok(value) => {
                info.last_result = Some(value);
                info.last_error = None;
            }
            Err(e) => info.last_error = Some(e),
        }
    }

    pub fn task_info(&self, task: &str) -> Option<TaskRunInfo> {
        self.runs
            .lock()
            .expect("run info mutex poisoned")
            .get(task)
            .cloned()
    }

    pub fn stats(&self) -> JobStats {
        let registered: HashSet<String> = self
            .tasks
            .read()
            .expect("task registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        let now = Utc::now();
        let schedule = self
            .config
            .schedule
            .iter()
            .map(|spec| ScheduleEntry {
                name: spec.name.clone(),
                task: spec.task.clone(),
                queue: spec.queue,
                registered: registered.contains(&spec.task),
                next_run: spec.schedule.next_run(now),
            })
            .collect();
        let mut registered_tasks: Vec<String> = registered.into_iter().collect();
        registered_tasks.sort();

        JobStats {
            enabled: self.config.enabled,
            registered_tasks,
            queued: self.queued(),
            running: self.counters.running.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            timed_out: self.counters.timed_out.load(Ordering::Relaxed),
            tasks: self
                .runs
                .lock()
                .expect("run info mutex poisoned")
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            schedule,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::jobs::schedule::Schedule;
    use chrono::TimeZone;
    use serde_json::json;

    pub(crate) struct Noop(pub &'static str);

    #[async_trait]
    impl Task for Noop {
        fn name(&self) -> &str {
            self.0
        }

        async fn run(&self) -> Result<Value, String> {
            Ok(json!({ "ok": true }))
        }
    }

    fn config(schedule: Vec<JobSpec>) -> JobsConfig {
        JobsConfig {
            schedule,
            queue_capacity: 2,
            ..JobsConfig::default()
        }
    }

    fn spec(name: &str, task: &str, queue: Queue, minutes: u32) -> JobSpec {
        JobSpec {
            name: name.into(),
            task: task.into(),
            queue,
            schedule: Schedule::Every { minutes },
        }
    }

    #[test]
    fn test_priority_order() {
        let scheduler = JobScheduler::new(config(vec![]));
        scheduler.register(Arc::new(Noop("a")));
        scheduler.enqueue("a", Queue::LowPriority).unwrap();
        scheduler.enqueue("a", Queue::HighPriority).unwrap();
        scheduler.enqueue("a", Queue::MediumPriority).unwrap();

        let order: Vec<Queue> = std::iter::from_fn(|| scheduler.pop()).map(|j| j.queue).collect();
        assert_eq!(order, vec![Queue::HighPriority, Queue::MediumPriority, Queue::LowPriority]);
    }

    #[test]
    fn test_enqueue_errors() {
        let scheduler = JobScheduler::new(config(vec![]));
        assert_eq!(
            scheduler.enqueue("ghost", Queue::HighPriority).unwrap_err(),
            EnqueueError::UnknownTask("ghost".into())
        );
        scheduler.register(Arc::new(Noop("a")));
        scheduler.enqueue("a", Queue::HighPriority).unwrap();
        scheduler.enqueue("a", Queue::HighPriority).unwrap();
        assert_eq!(
            scheduler.enqueue("a", Queue::HighPriority).unwrap_err(),
            EnqueueError::QueueFull(Queue::HighPriority)
        );
    }

    #[test]
    fn test_beat_tick_enqueues_once_per_minute() {
        let scheduler = JobScheduler::new(config(vec![
            spec("quarter", "a", Queue::HighPriority, 15),
            spec("missing", "ghost", Queue::LowPriority, 15),
            spec("odd", "a", Queue::LowPriority, 7),
        ]));
        scheduler.register(Arc::new(Noop("a")));

        let t = Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 5).unwrap();
        assert_eq!(scheduler.beat_tick(t), 1);
        assert_eq!(scheduler.beat_tick(t + chrono::Duration::seconds(20)), 0);
        assert_eq!(scheduler.queued()[&Queue::HighPriority], 1);

        let stats = scheduler.stats();
        let missing = stats.schedule.iter().find(|e| e.name == "missing").unwrap();
        assert!(!missing.registered);
        assert!(missing.next_run.is_some());
    }

    #[test]
    fn test_trigger_uses_scheduled_queue() {
        let scheduler = JobScheduler::new(config(vec![spec("q", "a", Queue::LowPriority, 15)]));
        scheduler.register(Arc::new(Noop("a")));
        scheduler.register(Arc::new(Noop("b")));
        assert_eq!(scheduler.trigger("a").unwrap().queue, Queue::LowPriority);
        assert_eq!(scheduler.trigger("b").unwrap().queue, Queue::MediumPriority);
    }
}
