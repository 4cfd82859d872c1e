//! Live playback poll job.
//!
//! A chained job: each poll cycle schedules the next one through the
//! poller's [`SelfReschedulingTimer`](crate::background_jobs::SelfReschedulingTimer),
//! so the delay adapts to the request volume of the previous cycle.

use crate::background_jobs::{BackgroundJob, JobContext, JobError, JobSchedule};
use crate::listening::{PlaybackPoller, PollStatus};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const LIVE_PLAYBACK_POLL_JOB_ID: &str = "live_playback_poll";

pub struct LivePlaybackPollJob {
    poller: Arc<PlaybackPoller>,
    first_run: Duration,
    /// Re-arm delay used when a cycle ends without scheduling its successor.
    fallback: Duration,
}

impl LivePlaybackPollJob {
    pub fn new(poller: Arc<PlaybackPoller>, first_run: Duration, fallback: Duration) -> Self {
        Self {
            poller,
            first_run,
            fallback,
        }
    }
}

#[async_trait]
impl BackgroundJob for LivePlaybackPollJob {
    fn id(&self) -> &'static str {
        LIVE_PLAYBACK_POLL_JOB_ID
    }

    fn name(&self) -> &'static str {
        "Live Playback Poll"
    }

    fn description(&self) -> &'static str {
        "Poll current playback, cache now playing and record new listens"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Chained {
            first_run: self.first_run,
            fallback: self.fallback,
        }
    }

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Ok(());
        }

        let outcome = self.poller.poll_current_playback().await;
        if outcome.status == PollStatus::Skipped {
            debug!(
                "Live poll skipped ({:?}), next in {}s",
                outcome.reason, outcome.next_interval_secs
            );
        }
        Ok(())
    }
}
