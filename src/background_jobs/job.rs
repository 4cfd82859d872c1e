use super::context::JobContext;
use async_trait::async_trait;
use std::time::Duration;

/// Schedule for when a job should run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSchedule {
    /// Run at registration, then `interval` after each completed run.
    Interval(Duration),
    /// Run once `first_run` after registration; every later run is scheduled
    /// by the job itself through a [`super::SelfReschedulingTimer`].
    ///
    /// If a run ends with nothing pending for the job, the scheduler re-arms
    /// it after `fallback` so the chain never silently stops.
    Chained { first_run: Duration, fallback: Duration },
}

/// Errors that can occur during job scheduling and execution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("Job not found")]
    NotFound,

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Scheduler is not running")]
    SchedulerStopped,
}

/// Trait for background jobs.
#[async_trait]
pub trait BackgroundJob: Send + Sync {
    /// Unique identifier for this job.
    fn id(&self) -> &'static str;

    /// Human-readable name for this job.
    fn name(&self) -> &'static str;

    /// Description of what this job does.
    fn description(&self) -> &'static str;

    /// When this job should be scheduled to run.
    fn schedule(&self) -> JobSchedule;

    /// Execute the job.
    ///
    /// Runs on its own task. An in-flight run is never interrupted; long jobs
    /// may check `ctx.is_cancelled()` to stop early during shutdown.
    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError>;
}
