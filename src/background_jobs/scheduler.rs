use super::context::JobContext;
use super::handle::{PendingRun, SchedulerCommand, SchedulerHandle, SharedJobState};
use super::job::{BackgroundJob, JobError, JobSchedule};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long the loop sleeps when nothing is pending.
const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// How long shutdown waits for each in-flight job.
const SHUTDOWN_JOB_TIMEOUT: Duration = Duration::from_secs(30);

/// Manages background job scheduling and execution.
pub struct JobScheduler {
    /// Shared state accessible by SchedulerHandle
    shared_state: Arc<RwLock<SharedJobState>>,

    /// Task handles of running jobs (managed by the scheduler loop only)
    running_handles: HashMap<String, JoinHandle<()>>,

    /// Cloned into job tasks so they can report completion
    command_tx: mpsc::Sender<SchedulerCommand>,

    command_receiver: mpsc::Receiver<SchedulerCommand>,

    /// Token to signal scheduler shutdown.
    shutdown_token: CancellationToken,
}

impl JobScheduler {
    fn new(
        command_tx: mpsc::Sender<SchedulerCommand>,
        command_receiver: mpsc::Receiver<SchedulerCommand>,
        shutdown_token: CancellationToken,
        shared_state: Arc<RwLock<SharedJobState>>,
    ) -> Self {
        Self {
            shared_state,
            running_handles: HashMap::new(),
            command_tx,
            command_receiver,
            shutdown_token,
        }
    }

    /// Register a job, replacing any job (and pending run) with the same id.
    pub async fn register_job(&mut self, job: Arc<dyn BackgroundJob>) {
        let job_id = job.id().to_string();
        let first_run = match job.schedule() {
            JobSchedule::Interval(_) => Duration::ZERO,
            JobSchedule::Chained { first_run, .. } => first_run,
        };
        info!(
            "Registering job: {} - {} (first run in {:?})",
            job_id,
            job.description(),
            first_run
        );

        let mut state = self.shared_state.write().await;
        if state.jobs.insert(job_id.clone(), job).is_some() {
            info!("Replaced previously registered job {}", job_id);
        }
        state.pending.insert(
            job_id,
            PendingRun {
                at: Instant::now() + first_run,
                triggered_by: "startup",
            },
        );
    }

    /// Get the number of registered jobs.
    pub async fn job_count(&self) -> usize {
        self.shared_state.read().await.jobs.len()
    }

    /// Main scheduler loop. Returns after the shutdown token is cancelled
    /// and in-flight jobs have finished (or timed out).
    pub async fn run(&mut self) {
        let job_count = self.job_count().await;
        info!("Starting job scheduler with {} registered jobs", job_count);

        loop {
            self.cleanup_completed_jobs().await;

            let wake_at = self.next_wakeup().await;
            debug!(
                "Scheduler sleeping for {:?} until next scheduled job",
                wake_at.saturating_duration_since(Instant::now())
            );

            tokio::select! {
                biased;
                _ = self.shutdown_token.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    self.shutdown().await;
                    break;
                }
                Some(cmd) = self.command_receiver.recv() => {
                    self.handle_command(cmd).await;
                }
                _ = tokio::time::sleep_until(wake_at) => {
                    self.run_due_jobs().await;
                }
            }
        }

        info!("Job scheduler stopped");
    }

    async fn handle_command(&mut self, cmd: SchedulerCommand) {
        match cmd {
            SchedulerCommand::Schedule {
                job_id,
                delay,
                response,
            } => {
                let result = self.schedule_job(&job_id, delay).await;
                let _ = response.send(result);
            }
            SchedulerCommand::JobFinished { job_id } => {
                if let Some(handle) = self.running_handles.remove(&job_id) {
                    let _ = handle.await;
                    self.after_run(&job_id).await;
                }
            }
        }
    }

    async fn schedule_job(&mut self, job_id: &str, delay: Duration) -> Result<(), JobError> {
        let mut state = self.shared_state.write().await;
        if !state.jobs.contains_key(job_id) {
            return Err(JobError::NotFound);
        }
        let replaced = state.pending.insert(
            job_id.to_string(),
            PendingRun {
                at: Instant::now() + delay,
                triggered_by: "schedule",
            },
        );
        if replaced.is_some() {
            debug!("Replaced pending run of {}", job_id);
        }
        Ok(())
    }

    /// The earliest pending run among jobs that are not running.
    async fn next_wakeup(&self) -> Instant {
        let default_wakeup = Instant::now() + IDLE_CHECK_INTERVAL;
        let state = self.shared_state.read().await;
        state
            .pending
            .iter()
            .filter(|(job_id, _)| !state.running_jobs.contains(*job_id))
            .map(|(_, run)| run.at)
            .min()
            .map_or(default_wakeup, |at| at.min(default_wakeup))
    }

    async fn run_due_jobs(&mut self) {
        let now = Instant::now();
        let due: Vec<String> = {
            let state = self.shared_state.read().await;
            state
                .pending
                .iter()
                .filter(|(job_id, run)| run.at <= now && !state.running_jobs.contains(*job_id))
                .map(|(job_id, _)| job_id.clone())
                .collect()
        };

        for job_id in due {
            self.spawn_job(&job_id).await;
        }
    }

    /// Spawn a job execution task, consuming its pending run.
    async fn spawn_job(&mut self, job_id: &str) {
        let (job, triggered_by) = {
            let mut state = self.shared_state.write().await;
            let job = match state.jobs.get(job_id) {
                Some(job) => Arc::clone(job),
                None => {
                    error!("Attempted to spawn unknown job: {}", job_id);
                    return;
                }
            };
            let triggered_by = state
                .pending
                .remove(job_id)
                .map_or("schedule", |run| run.triggered_by);
            // Interval jobs keep a placeholder so the loop doesn't spin while they run.
            if let JobSchedule::Interval(interval) = job.schedule() {
                state.pending.insert(
                    job_id.to_string(),
                    PendingRun {
                        at: Instant::now() + interval,
                        triggered_by: "schedule",
                    },
                );
            }
            state.running_jobs.insert(job_id.to_string());
            (job, triggered_by)
        };

        debug!("Starting job: {} (triggered_by: {})", job_id, triggered_by);

        let ctx = JobContext::new(self.shutdown_token.child_token(), triggered_by);
        let command_tx = self.command_tx.clone();
        let job_id_owned = job_id.to_string();

        let handle = tokio::spawn(async move {
            let start_time = Instant::now();
            // Inner task so a panicking job is reported instead of tearing this one down.
            let result = tokio::spawn(async move { job.execute(&ctx).await }).await;
            let elapsed = start_time.elapsed();

            match result {
                Ok(Ok(())) => debug!("Job {} completed in {:?}", job_id_owned, elapsed),
                Ok(Err(e)) => error!("Job {} failed after {:?}: {}", job_id_owned, elapsed, e),
                Err(e) => error!("Job {} panicked after {:?}: {}", job_id_owned, elapsed, e),
            }

            let _ = command_tx
                .send(SchedulerCommand::JobFinished {
                    job_id: job_id_owned,
                })
                .await;
        });

        self.running_handles.insert(job_id.to_string(), handle);
    }

    /// Bookkeeping after a run: clear the running flag and make sure the job
    /// has a next occurrence.
    async fn after_run(&self, job_id: &str) {
        let mut state = self.shared_state.write().await;
        state.running_jobs.remove(job_id);

        let Some(job) = state.jobs.get(job_id).cloned() else {
            return;
        };
        match job.schedule() {
            JobSchedule::Interval(interval) => {
                state.pending.insert(
                    job_id.to_string(),
                    PendingRun {
                        at: Instant::now() + interval,
                        triggered_by: "schedule",
                    },
                );
            }
            JobSchedule::Chained { fallback, .. } => {
                if !state.pending.contains_key(job_id) {
                    warn!(
                        "Job {} finished without scheduling its next run, re-arming in {:?}",
                        job_id, fallback
                    );
                    state.pending.insert(
                        job_id.to_string(),
                        PendingRun {
                            at: Instant::now() + fallback,
                            triggered_by: "watchdog",
                        },
                    );
                }
            }
        }
    }

    /// Clean up handles of jobs whose completion message was not handled yet.
    async fn cleanup_completed_jobs(&mut self) {
        let completed: Vec<String> = self
            .running_handles
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(job_id, _)| job_id.clone())
            .collect();

        for job_id in completed {
            if let Some(handle) = self.running_handles.remove(&job_id) {
                let _ = handle.await;
            }
            self.after_run(&job_id).await;
        }
    }

    /// Stop accepting commands and wait for in-flight jobs without interrupting them.
    async fn shutdown(&mut self) {
        info!("Shutting down scheduler...");

        // Reschedule requests from jobs still running now fail fast.
        self.command_receiver.close();
        while self.command_receiver.try_recv().is_ok() {}

        for (job_id, handle) in self.running_handles.drain() {
            info!("Waiting for job {} to complete...", job_id);
            if tokio::time::timeout(SHUTDOWN_JOB_TIMEOUT, handle).await.is_err() {
                warn!("Job {} did not finish within {:?}", job_id, SHUTDOWN_JOB_TIMEOUT);
            }
        }

        let mut state = self.shared_state.write().await;
        state.pending.clear();
        state.running_jobs.clear();
        info!("Scheduler shutdown complete");
    }
}

/// Create a scheduler and its handle.
pub fn create_scheduler(shutdown_token: CancellationToken) -> (JobScheduler, SchedulerHandle) {
    let (command_tx, command_rx) = mpsc::channel(100);
    let shared_state = Arc::new(RwLock::new(SharedJobState::default()));

    let scheduler = JobScheduler::new(
        command_tx.clone(),
        command_rx,
        shutdown_token,
        Arc::clone(&shared_state),
    );
    let handle = SchedulerHandle::new(command_tx, shared_state);

    (scheduler, handle)
}
