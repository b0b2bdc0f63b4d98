//! Worker pool draining the job queues.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Semaphore};

use crate::jobs::scheduler::{Job, JobScheduler, RunOutcome};
use crate::observability::metrics;
use crate::resilience::{retry_async, RetryPolicy};

const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Runs queued jobs with bounded concurrency and a per-run time limit.
pub struct WorkerPool {
    scheduler: Arc<JobScheduler>,
    permits: Arc<Semaphore>,
    concurrency: usize,
    time_limit: Duration,
}

impl WorkerPool {
    pub fn new(scheduler: Arc<JobScheduler>) -> Self {
        let concurrency = scheduler.config().worker_concurrency.max(1);
        let time_limit = Duration::from_secs(scheduler.config().task_time_limit_secs.max(1));
        Self {
            scheduler,
            permits: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            time_limit,
        }
    }

    /// Take jobs until shutdown, then wait for in-flight runs to finish.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            concurrency = self.concurrency,
            time_limit_secs = self.time_limit.as_secs(),
            "Worker pool starting"
        );
        loop {
            while let Some(job) = self.scheduler.pop() {
                let permit = tokio::select! {
                    permit = self.permits.clone().acquire_owned() => match permit {
                        Ok(p) => p,
                        Err(_) => return,
                    },
                    _ = shutdown.recv() => {
                        tracing::info!(job_id = %job.id, task = %job.task, "Shutdown before job started, dropping");
                        self.drain().await;
                        return;
                    }
                };
                let scheduler = self.scheduler.clone();
                let time_limit = self.time_limit;
                tokio::spawn(async move {
                    execute(&scheduler, job, time_limit).await;
                    drop(permit);
                });
            }

            tokio::select! {
                _ = self.scheduler.wait_for_job() => {}
                _ = shutdown.recv() => {
                    tracing::info!("Worker pool received shutdown signal");
                    self.drain().await;
                    return;
                }
            }
        }
    }

    async fn drain(&self) {
        let in_flight = self.concurrency - self.permits.available_permits();
        if in_flight > 0 {
            tracing::info!(in_flight, "Waiting for running jobs");
        }
        let _ = self.permits.acquire_many(self.concurrency as u32).await;
        tracing::info!("Worker pool stopped");
    }
}

/// Run one job to completion and record the outcome.
pub(crate) async fn execute(scheduler: &JobScheduler, job: Job, time_limit: Duration) -> RunOutcome {
    let Some(task) = scheduler.task(&job.task) else {
        tracing::warn!(job_id = %job.id, task = %job.task, "Task vanished before run");
        return RunOutcome::Failed;
    };

    scheduler.run_started();
    let start = Instant::now();
    let policy = RetryPolicy::linear(task.max_retries(), RETRY_DELAY);
    let attempt = tokio::time::timeout(
        time_limit,
        retry_async(&policy, |_: &String| true, |_| task.run()),
    )
    .await;

    let (outcome, result) = match attempt {
        Ok(Ok(value)) => (RunOutcome::Success, Ok(value)),
        Ok(Err((e, attempts))) => {
            tracing::error!(job_id = %job.id, task = %job.task, attempts, error = %e, "Job failed");
            (RunOutcome::Failed, Err(e))
        }
        Err(_) => {
            tracing::error!(
                job_id = %job.id,
                task = %job.task,
                limit_secs = time_limit.as_secs(),
                "Job exceeded time limit"
            );
            (RunOutcome::TimedOut, Err("time limit exceeded".to_string()))
        }
    };

    let elapsed = start.elapsed();
    if outcome == RunOutcome::Success {
        tracing::info!(
            job_id = %job.id,
            task = %job.task,
            queue = %job.queue,
            duration_ms = elapsed.as_millis() as u64,
            "Job completed"
        );
    }
    metrics::record_job(&job.task, outcome.as_str());
    scheduler.run_finished(&job.task, outcome, elapsed, result);
    outcome
}
