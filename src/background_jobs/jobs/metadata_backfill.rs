//! Full metadata backfill job.
//!
//! Scans every stored track for artists and albums that were never synced,
//! for instance because a batch failed when the track was first seen.

use crate::background_jobs::{BackgroundJob, JobContext, JobError, JobSchedule};
use crate::listening::MetadataSyncer;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct MetadataBackfillJob {
    syncer: Arc<MetadataSyncer>,
    interval: Duration,
}

impl MetadataBackfillJob {
    pub fn new(syncer: Arc<MetadataSyncer>, interval: Duration) -> Self {
        Self { syncer, interval }
    }
}

#[async_trait]
impl BackgroundJob for MetadataBackfillJob {
    fn id(&self) -> &'static str {
        "metadata_backfill"
    }

    fn name(&self) -> &'static str {
        "Metadata Backfill"
    }

    fn description(&self) -> &'static str {
        "Fetch artists and albums referenced by stored tracks but missing locally"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Interval(self.interval)
    }

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Ok(());
        }

        let summary = self
            .syncer
            .sync_all_missing_metadata()
            .await
            .map_err(|e| JobError::ExecutionFailed(format!("{:#}", e)))?;
        info!(
            "Metadata backfill synced {} artists and {} albums",
            summary.artists_synced, summary.albums_synced
        );
        Ok(())
    }
}
