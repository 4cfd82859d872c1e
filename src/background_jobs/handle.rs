use super::job::{BackgroundJob, JobError, JobSchedule};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::time::Instant;

/// Information about a registered job.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub schedule: JobScheduleInfo,
    pub is_running: bool,
    pub next_run_in_secs: Option<u64>,
}

/// Serializable schedule information.
#[derive(Debug, Clone, Serialize)]
pub struct JobScheduleInfo {
    #[serde(rename = "type")]
    pub schedule_type: String,
    pub value_secs: u64,
}

impl From<JobSchedule> for JobScheduleInfo {
    fn from(schedule: JobSchedule) -> Self {
        match schedule {
            JobSchedule::Interval(duration) => JobScheduleInfo {
                schedule_type: "interval".to_string(),
                value_secs: duration.as_secs(),
            },
            JobSchedule::Chained { fallback, .. } => JobScheduleInfo {
                schedule_type: "chained".to_string(),
                value_secs: fallback.as_secs(),
            },
        }
    }
}

/// Command sent to the scheduler.
pub enum SchedulerCommand {
    /// Register-or-replace the pending run of `job_id`.
    Schedule {
        job_id: String,
        delay: Duration,
        response: oneshot::Sender<Result<(), JobError>>,
    },
    /// A spawned run finished; wakes the loop so it can re-arm the job.
    JobFinished { job_id: String },
}

/// The next occurrence of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRun {
    pub at: Instant,
    pub triggered_by: &'static str,
}

/// Shared state between scheduler and handle.
#[derive(Default)]
pub struct SharedJobState {
    pub jobs: HashMap<String, Arc<dyn BackgroundJob>>,
    /// Keyed by job id, so there is at most one pending run per job.
    pub pending: HashMap<String, PendingRun>,
    pub running_jobs: HashSet<String>,
}

/// Handle to interact with the job scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
    shared_state: Arc<RwLock<SharedJobState>>,
}

impl SchedulerHandle {
    pub fn new(
        command_tx: mpsc::Sender<SchedulerCommand>,
        shared_state: Arc<RwLock<SharedJobState>>,
    ) -> Self {
        Self {
            command_tx,
            shared_state,
        }
    }

    /// Run `job_id` after `delay`, replacing any run already pending for it.
    pub async fn schedule_in(&self, job_id: &str, delay: Duration) -> Result<(), JobError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(SchedulerCommand::Schedule {
                job_id: job_id.to_string(),
                delay,
                response: response_tx,
            })
            .await
            .map_err(|_| JobError::SchedulerStopped)?;
        response_rx.await.map_err(|_| JobError::SchedulerStopped)?
    }

    /// Time until the pending run of `job_id`, if one is pending.
    #[cfg(test)]
    pub async fn next_run_in(&self, job_id: &str) -> Option<Duration> {
        let state = self.shared_state.read().await;
        state
            .pending
            .get(job_id)
            .map(|run| run.at.saturating_duration_since(Instant::now()))
    }

    #[cfg(test)]
    pub async fn is_running(&self, job_id: &str) -> bool {
        self.shared_state.read().await.running_jobs.contains(job_id)
    }

    /// Get information about all registered jobs, sorted by id.
    pub async fn list_jobs(&self) -> Vec<JobInfo> {
        let state = self.shared_state.read().await;
        let now = Instant::now();
        let mut jobs: Vec<JobInfo> = state
            .jobs
            .iter()
            .map(|(job_id, job)| JobInfo {
                id: job_id.clone(),
                name: job.name().to_string(),
                description: job.description().to_string(),
                schedule: job.schedule().into(),
                is_running: state.running_jobs.contains(job_id),
                next_run_in_secs: state
                    .pending
                    .get(job_id)
                    .map(|run| run.at.saturating_duration_since(now).as_secs()),
            })
            .collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        jobs
    }
}
