//! Background job scheduling and execution system.
//!
//! Jobs are registered under a unique id and have at most one pending run.
//! Interval jobs are re-armed by the scheduler after each run; chained jobs
//! schedule their own next run through a [`SelfReschedulingTimer`].

mod context;
mod handle;
mod job;
pub mod jobs;
mod scheduler;
mod timer;

pub use context::JobContext;
pub use handle::{JobInfo, JobScheduleInfo, SchedulerHandle};
pub use job::{BackgroundJob, JobError, JobSchedule};
pub use scheduler::{create_scheduler, JobScheduler};
pub use timer::SelfReschedulingTimer;
