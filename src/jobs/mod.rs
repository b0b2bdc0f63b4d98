//! Background jobs subsystem.
//!
//! # Data Flow
//! ```text
//! Beat loop (scheduler.rs, every 10s):
//!     → schedule.rs decides which JobSpecs fire this minute
//!     → enqueue onto high / medium / low priority queue
//!
//! Manual trigger (admin API):
//!     → enqueue onto the job's configured queue
//!
//! WorkerPool (worker.rs):
//!     → pop highest priority job
//!     → bounded by worker_concurrency, cut off at task_time_limit
//!     → retry per task, record outcome and metrics
//! ```
//!
//! Built-in tasks live in tasks.rs. Schedule entries whose task is not
//! registered are skipped with a single warning.

pub mod schedule;
pub mod scheduler;
pub mod tasks;
pub mod worker;

pub use schedule::{default_beat_schedule, JobSpec, Queue, Schedule};
pub use scheduler::{EnqueueError, Job, JobScheduler, JobStats, RunOutcome, Task, TaskRunInfo};
pub use tasks::{register_builtin_tasks, TaskContext};
pub use worker::WorkerPool;
