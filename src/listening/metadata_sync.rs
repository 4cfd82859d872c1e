//! Lazy artist/album reference data sync.
//!
//! The missing set is always recomputed from the store, so a sync can be
//! interrupted at any point and simply run again.

use super::models::TrackMetadata;
use crate::listen_store::ListenStore;
use crate::rate_limit::AdaptiveRateLimiter;
use crate::upstream::UpstreamApi;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Largest id list the upstream accepts for a multi-artist fetch.
pub const ARTIST_BATCH_SIZE: usize = 50;

/// Largest id list the upstream accepts for a multi-album fetch.
pub const ALBUM_BATCH_SIZE: usize = 20;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetadataSyncSummary {
    pub artists_synced: usize,
    pub albums_synced: usize,
}

/// Detailed result of one sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataSyncReport {
    pub artists_synced: usize,
    pub albums_synced: usize,
    /// Successful upstream fetches.
    pub requests_made: usize,
    pub failed_batches: usize,
}

impl MetadataSyncReport {
    pub fn summary(&self) -> MetadataSyncSummary {
        MetadataSyncSummary {
            artists_synced: self.artists_synced,
            albums_synced: self.albums_synced,
        }
    }

    fn merge(&mut self, other: MetadataSyncReport) {
        self.artists_synced += other.artists_synced;
        self.albums_synced += other.albums_synced;
        self.requests_made += other.requests_made;
        self.failed_batches += other.failed_batches;
    }
}

pub struct MetadataSyncer {
    store: Arc<dyn ListenStore>,
    upstream: Arc<dyn UpstreamApi>,
    rate_limiter: Arc<AdaptiveRateLimiter>,
}

impl MetadataSyncer {
    pub fn new(
        store: Arc<dyn ListenStore>,
        upstream: Arc<dyn UpstreamApi>,
        rate_limiter: Arc<AdaptiveRateLimiter>,
    ) -> Self {
        Self {
            store,
            upstream,
            rate_limiter,
        }
    }

    /// Sync the artists and album referenced by one track.
    ///
    /// Never fails; store errors are logged and yield an empty report.
    pub async fn sync_track(&self, track: &TrackMetadata) -> MetadataSyncReport {
        let album_ids: Vec<String> = track.album_id.iter().cloned().collect();
        match self.sync_referenced(&track.artist_ids, &album_ids).await {
            Ok(report) => report,
            Err(e) => {
                warn!(
                    "Metadata sync for track {} failed: {:#}",
                    track.track_id, e
                );
                MetadataSyncReport::default()
            }
        }
    }

    /// Fetch and store whichever of the given ids are not stored yet.
    pub async fn sync_referenced(
        &self,
        artist_ids: &[String],
        album_ids: &[String],
    ) -> Result<MetadataSyncReport> {
        let existing_artists = self
            .store
            .existing_artist_ids(artist_ids)
            .context("Failed to look up stored artists")?;
        let missing_artists = missing_ids(artist_ids, &existing_artists);

        let existing_albums = self
            .store
            .existing_album_ids(album_ids)
            .context("Failed to look up stored albums")?;
        let missing_albums = missing_ids(album_ids, &existing_albums);

        let mut report = self.sync_artist_batches(&missing_artists).await;
        report.merge(self.sync_album_batches(&missing_albums).await);
        Ok(report)
    }

    pub async fn sync_all_missing_metadata(&self) -> Result<MetadataSyncSummary> {
        Ok(self.sync_all_missing_metadata_report().await?.summary())
    }

    /// Scan every stored track and sync all missing artists and albums.
    pub async fn sync_all_missing_metadata_report(&self) -> Result<MetadataSyncReport> {
        let artist_ids = sorted(self.store.referenced_artist_ids()?);
        let album_ids = sorted(self.store.referenced_album_ids()?);
        debug!(
            "Full metadata scan: {} referenced artists, {} referenced albums",
            artist_ids.len(),
            album_ids.len()
        );

        let report = self.sync_referenced(&artist_ids, &album_ids).await?;
        if report.artists_synced > 0 || report.albums_synced > 0 || report.failed_batches > 0 {
            info!(
                "Metadata sync: {} artists, {} albums ({} failed batches)",
                report.artists_synced, report.albums_synced, report.failed_batches
            );
        }
        Ok(report)
    }

    async fn sync_artist_batches(&self, missing: &[String]) -> MetadataSyncReport {
        let mut report = MetadataSyncReport::default();
        for batch in missing.chunks(ARTIST_BATCH_SIZE) {
            self.rate_limiter.wait_if_needed().await;
            let fetched = self.upstream.get_artists(batch).await;
            self.rate_limiter.record(1);

            let artists: Vec<_> = match fetched {
                Ok(artists) => artists.into_iter().flatten().collect(),
                Err(e) => {
                    warn!("Failed to fetch {} artists: {}", batch.len(), e);
                    report.failed_batches += 1;
                    continue;
                }
            };
            report.requests_made += 1;

            match self.store.insert_artists(&artists) {
                Ok(inserted) => {
                    debug!("Stored {} of {} requested artists", inserted, batch.len());
                    report.artists_synced += inserted;
                }
                Err(e) => {
                    warn!("Failed to store artist batch: {:#}", e);
                    report.failed_batches += 1;
                }
            }
        }
        report
    }

    async fn sync_album_batches(&self, missing: &[String]) -> MetadataSyncReport {
        let mut report = MetadataSyncReport::default();
        for batch in missing.chunks(ALBUM_BATCH_SIZE) {
            self.rate_limiter.wait_if_needed().await;
            let fetched = self.upstream.get_albums(batch).await;
            self.rate_limiter.record(1);

            let albums: Vec<_> = match fetched {
                Ok(albums) => albums.into_iter().flatten().collect(),
                Err(e) => {
                    warn!("Failed to fetch {} albums: {}", batch.len(), e);
                    report.failed_batches += 1;
                    continue;
                }
            };
            report.requests_made += 1;

            match self.store.insert_albums(&albums) {
                Ok(inserted) => {
                    debug!("Stored {} of {} requested albums", inserted, batch.len());
                    report.albums_synced += inserted;
                }
                Err(e) => {
                    warn!("Failed to store album batch: {:#}", e);
                    report.failed_batches += 1;
                }
            }
        }
        report
    }
}

/// `ids` minus `existing`, deduplicated, first-seen order kept.
fn missing_ids(ids: &[String], existing: &HashSet<String>) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut missing = Vec::new();
    for id in ids {
        if !id.is_empty() && !existing.contains(id) && seen.insert(id.as_str()) {
            missing.push(id.clone());
        }
    }
    missing
}

fn sorted(ids: HashSet<String>) -> Vec<String> {
    let mut ids: Vec<String> = ids.into_iter().collect();
    ids.sort();
    ids
}
