use super::handle::SchedulerHandle;
use std::time::Duration;
use tracing::{debug, error};

/// Lets a chained job schedule its own next run.
///
/// Rescheduling replaces whatever run is already pending for the job, so a
/// job never has more than one future occurrence.
#[derive(Clone)]
pub struct SelfReschedulingTimer {
    scheduler: SchedulerHandle,
    job_id: &'static str,
}

impl SelfReschedulingTimer {
    pub fn new(scheduler: SchedulerHandle, job_id: &'static str) -> Self {
        Self { scheduler, job_id }
    }

    /// Schedule the next run. Failures are logged and reported as `false`;
    /// the scheduler's fallback re-arm covers a lost reschedule.
    pub async fn reschedule(&self, delay: Duration) -> bool {
        match self.scheduler.schedule_in(self.job_id, delay).await {
            Ok(()) => {
                debug!("Next {} run in {:?}", self.job_id, delay);
                true
            }
            Err(e) => {
                error!("Failed to reschedule {}: {}", self.job_id, e);
                false
            }
        }
    }
}
