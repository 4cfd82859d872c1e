//! Recently played backstop job.
//!
//! Runs at startup, to pick up listens made while the daemon was down, and
//! then on a fixed cadence.

use crate::background_jobs::{BackgroundJob, JobContext, JobError, JobSchedule};
use crate::listening::RecentlyPlayedBackstop;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct RecentlyPlayedBackstopJob {
    backstop: Arc<RecentlyPlayedBackstop>,
    interval: Duration,
}

impl RecentlyPlayedBackstopJob {
    pub fn new(backstop: Arc<RecentlyPlayedBackstop>, interval: Duration) -> Self {
        Self { backstop, interval }
    }
}

#[async_trait]
impl BackgroundJob for RecentlyPlayedBackstopJob {
    fn id(&self) -> &'static str {
        "recently_played_backstop"
    }

    fn name(&self) -> &'static str {
        "Recently Played Backstop"
    }

    fn description(&self) -> &'static str {
        "Reconcile the play log with the recently played history"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Interval(self.interval)
    }

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Ok(());
        }

        let outcome = self.backstop.poll_recently_played().await;
        debug!(
            "Backstop ({}): {:?} inserted={} skipped={}",
            ctx.triggered_by, outcome.status, outcome.inserted, outcome.skipped
        );
        Ok(())
    }
}
