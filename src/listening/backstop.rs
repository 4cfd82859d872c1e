//! Hourly reconciliation against the recently-played endpoint.
//!
//! The live poller only samples what is playing right now, so a listen that
//! starts and ends between two samples (or while the daemon is down) is never
//! seen by it. The backstop replays the recent history through the play log's
//! unique key, which collapses everything the live poller already recorded.

use super::metadata_sync::MetadataSyncer;
use super::models::PlayLogEntry;
use super::poller::{PollStatus, SkipReason};
use super::ListeningDeps;
use crate::listen_store::PlayInsert;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackstopOutcome {
    pub status: PollStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<SkipReason>,
    pub inserted: usize,
    pub skipped: usize,
    /// Events that could not be stored at all.
    pub failed: usize,
}

impl BackstopOutcome {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            status: PollStatus::Skipped,
            reason: Some(reason),
            inserted: 0,
            skipped: 0,
            failed: 0,
        }
    }
}

pub struct RecentlyPlayedBackstop {
    deps: ListeningDeps,
    syncer: Arc<MetadataSyncer>,
    limit: usize,
}

impl RecentlyPlayedBackstop {
    pub fn new(deps: ListeningDeps, syncer: Arc<MetadataSyncer>, limit: usize) -> Self {
        Self { deps, syncer, limit }
    }

    pub async fn poll_recently_played(&self) -> BackstopOutcome {
        if !self.deps.has_credentials() {
            return BackstopOutcome::skipped(SkipReason::Unauthenticated);
        }

        let fetched = self.deps.upstream.get_recently_played(self.limit).await;
        self.deps.rate_limiter.record(1);
        let events = match fetched {
            Ok(events) => events,
            Err(e) => {
                warn!("Failed to fetch recently played: {}", e);
                return BackstopOutcome::skipped(SkipReason::from(&e));
            }
        };

        let store = self.deps.store.as_ref();
        let mut outcome = BackstopOutcome {
            status: PollStatus::Ok,
            reason: None,
            inserted: 0,
            skipped: 0,
            failed: 0,
        };
        let mut new_artist_ids: Vec<String> = Vec::new();
        let mut new_album_ids: Vec<String> = Vec::new();

        for event in &events {
            let entry = match PlayLogEntry::from_event(event) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping invalid recently played event: {}", e);
                    outcome.failed += 1;
                    continue;
                }
            };

            let increment = match store.insert_play(&entry) {
                Ok(PlayInsert::Inserted) => {
                    outcome.inserted += 1;
                    true
                }
                Ok(PlayInsert::Duplicate) => {
                    debug!(
                        "Backstop: play of {} at {} already logged",
                        entry.track_id, entry.listened_at
                    );
                    outcome.skipped += 1;
                    false
                }
                Err(e) => {
                    error!("Failed to log play of {}: {:#}", entry.track_id, e);
                    outcome.failed += 1;
                    continue;
                }
            };

            match store.upsert_track(&event.track, event.played_at, increment) {
                Ok(upsert) if upsert.was_created() => {
                    new_artist_ids.extend(event.track.artist_ids.iter().cloned());
                    new_album_ids.extend(event.track.album_id.iter().cloned());
                }
                Ok(_) => {}
                Err(e) => error!("Failed to store track {}: {:#}", event.track.track_id, e),
            }
        }

        if !new_artist_ids.is_empty() || !new_album_ids.is_empty() {
            match self
                .syncer
                .sync_referenced(&new_artist_ids, &new_album_ids)
                .await
            {
                Ok(report) => debug!(
                    "Backstop metadata sync: {} artists, {} albums",
                    report.artists_synced, report.albums_synced
                ),
                Err(e) => warn!("Backstop metadata sync failed: {:#}", e),
            }
        }

        if outcome.inserted > 0 || outcome.failed > 0 {
            info!(
                "Recently played backstop: {} inserted, {} already logged, {} failed",
                outcome.inserted, outcome.skipped, outcome.failed
            );
        }
        outcome
    }
}
