//! Listening history ingestion: the live poller, the recently-played
//! backstop and lazy artist/album metadata sync.

mod backstop;
mod metadata_sync;
mod models;
mod poller;
mod state_tracker;
mod widget;

pub use backstop::{BackstopOutcome, RecentlyPlayedBackstop};
pub use metadata_sync::{
    MetadataSyncReport, MetadataSyncSummary, MetadataSyncer, ALBUM_BATCH_SIZE, ARTIST_BATCH_SIZE,
};
pub use models::{
    round_to_minute, snapshot_ttl, Album, Artist, ListenEvent, ModelError, NowPlaying,
    PlayLogEntry, PlaybackContext, PlaybackSnapshot, TrackMetadata, TrackRecord,
    SNAPSHOT_TTL_BUFFER_SECS, SNAPSHOT_TTL_FLOOR_SECS,
};
pub use poller::{PlaybackPollOutcome, PlaybackPoller, PollIntervalPolicy, PollStatus, SkipReason};
pub use state_tracker::{LastSeenMarker, ListenStateTracker, ListenTransition};
pub use widget::render_now_playing_svg;

use crate::cache::{EphemeralCache, InMemoryCache};
use crate::config::AppConfig;
use crate::credentials::{CredentialStore, FileCredentialStore};
use crate::listen_store::{ListenStore, SqliteListenStore};
use crate::rate_limit::AdaptiveRateLimiter;
use crate::upstream::{SpotifyClient, UpstreamApi};
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Collaborators shared by the pollers and the metadata syncer.
#[derive(Clone)]
pub struct ListeningDeps {
    pub credentials: Arc<dyn CredentialStore>,
    pub upstream: Arc<dyn UpstreamApi>,
    pub cache: Arc<dyn EphemeralCache>,
    pub store: Arc<dyn ListenStore>,
    pub rate_limiter: Arc<AdaptiveRateLimiter>,
}

impl ListeningDeps {
    /// Open the durable store and build the upstream client for `config`.
    ///
    /// The ephemeral cache is process-local, so every process starts with an
    /// empty now-playing cache and no last-seen marker.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        info!("Opening listen store at {:?}...", config.db_path);
        let store = Arc::new(SqliteListenStore::new(&config.db_path)?);

        info!("Using credentials at {:?}", config.token_path);
        let credentials: Arc<dyn CredentialStore> =
            Arc::new(FileCredentialStore::new(&config.token_path));
        let upstream = Arc::new(SpotifyClient::new(&config.upstream, Arc::clone(&credentials))?);

        Ok(Self {
            credentials,
            upstream,
            cache: Arc::new(InMemoryCache::new()),
            store,
            rate_limiter: Arc::new(AdaptiveRateLimiter::new(&config.rate_limiter)),
        })
    }

    pub fn metadata_syncer(&self) -> MetadataSyncer {
        MetadataSyncer::new(
            Arc::clone(&self.store),
            Arc::clone(&self.upstream),
            Arc::clone(&self.rate_limiter),
        )
    }

    /// Whether an access token is cached. Expired tokens count: the upstream
    /// client refreshes them when it can.
    fn has_credentials(&self) -> bool {
        match self.credentials.get_cached_token() {
            Ok(Some(_)) => true,
            Ok(None) => {
                debug!("No cached access token, skipping upstream call");
                false
            }
            Err(e) => {
                warn!("Failed to read cached access token: {:#}", e);
                false
            }
        }
    }
}
