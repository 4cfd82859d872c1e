#![allow(dead_code)]

use super::constants::TRACK_DURATION_MS;
use super::fake_upstream::FakeUpstream;
use chrono::{DateTime, TimeZone, Utc};
use hoardify::cache::{
    EphemeralCache, InMemoryCache, NOW_PLAYING_CACHE_KEY, NOW_PLAYING_WIDGET_CACHE_KEY,
};
use hoardify::config::RateLimiterSettings;
use hoardify::credentials::{AccessToken, CredentialStore, MemoryCredentialStore};
use hoardify::listen_store::SqliteListenStore;
use hoardify::listening::{
    ListenEvent, ListeningDeps, MetadataSyncer, NowPlaying, PlaybackContext, PlaybackPoller,
    PlaybackSnapshot, PollIntervalPolicy, RecentlyPlayedBackstop, TrackMetadata,
};
use hoardify::rate_limit::AdaptiveRateLimiter;
use std::sync::Arc;
use tempfile::TempDir;

pub struct TestHarness {
    pub upstream: Arc<FakeUpstream>,
    pub cache: Arc<InMemoryCache>,
    pub credentials: Arc<MemoryCredentialStore>,
    pub store: Arc<SqliteListenStore>,
    pub rate_limiter: Arc<AdaptiveRateLimiter>,
    _temp_dir: TempDir,
}

impl TestHarness {
    /// Harness with a valid access token.
    pub fn new() -> Self {
        let harness = Self::unauthenticated();
        harness
            .credentials
            .save_token(&AccessToken {
                access_token: "test-access-token".to_string(),
                refresh_token: None,
                expires_at: None,
                scope: None,
            })
            .expect("Failed to save token");
        harness
    }

    pub fn unauthenticated() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = SqliteListenStore::new(temp_dir.path().join("listens.db"))
            .expect("Failed to create listen store");
        Self {
            upstream: Arc::new(FakeUpstream::new()),
            cache: Arc::new(InMemoryCache::new()),
            credentials: Arc::new(MemoryCredentialStore::new()),
            store: Arc::new(store),
            rate_limiter: Arc::new(AdaptiveRateLimiter::new(&RateLimiterSettings::default())),
            _temp_dir: temp_dir,
        }
    }

    pub fn deps(&self) -> ListeningDeps {
        ListeningDeps {
            credentials: self.credentials.clone(),
            upstream: self.upstream.clone(),
            cache: self.cache.clone(),
            store: self.store.clone(),
            rate_limiter: self.rate_limiter.clone(),
        }
    }

    pub fn syncer(&self) -> Arc<MetadataSyncer> {
        Arc::new(self.deps().metadata_syncer())
    }

    pub fn poller(&self) -> PlaybackPoller {
        self.poller_with_policy(PollIntervalPolicy::Adaptive)
    }

    pub fn poller_with_policy(&self, policy: PollIntervalPolicy) -> PlaybackPoller {
        PlaybackPoller::new(self.deps(), self.syncer(), policy)
    }

    pub fn backstop(&self) -> RecentlyPlayedBackstop {
        RecentlyPlayedBackstop::new(self.deps(), self.syncer(), 50)
    }

    /// The now-playing entry as a cache consumer would read it.
    pub fn cached_now_playing(&self) -> Option<NowPlaying> {
        self.cache
            .get(NOW_PLAYING_CACHE_KEY)
            .unwrap()
            .map(|raw| serde_json::from_str(&raw).expect("Invalid cached now playing"))
    }

    pub fn cached_widget(&self) -> Option<String> {
        self.cache.get(NOW_PLAYING_WIDGET_CACHE_KEY).unwrap()
    }
}

pub fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, h, m, s).unwrap()
}

/// A track with one artist (`artist-<id>`) and one album (`album-<id>`).
pub fn track(id: &str) -> TrackMetadata {
    TrackMetadata {
        track_id: id.to_string(),
        name: format!("Song {}", id),
        artists: vec![format!("Band {}", id)],
        artist_ids: vec![format!("artist-{}", id)],
        album: format!("Record {}", id),
        album_id: Some(format!("album-{}", id)),
        album_art: None,
        duration_ms: TRACK_DURATION_MS,
        explicit: Some(false),
        popularity: Some(42),
        disc_number: Some(1),
        track_number: Some(1),
        isrc: None,
    }
}

pub fn snapshot(id: &str, progress_ms: i64, observed_at: DateTime<Utc>) -> PlaybackSnapshot {
    PlaybackSnapshot::new(
        track(id),
        true,
        progress_ms,
        Some(format!("https://open.spotify.com/track/{}", id)),
        PlaybackContext {
            device_name: Some("Desk".to_string()),
            device_type: Some("Computer".to_string()),
            ..Default::default()
        },
        observed_at,
    )
    .expect("Invalid fixture snapshot")
}

pub fn event(id: &str, played_at: DateTime<Utc>) -> ListenEvent {
    ListenEvent::new(
        track(id),
        played_at,
        PlaybackContext {
            context_type: Some("playlist".to_string()),
            context_uri: Some("spotify:playlist:fixture".to_string()),
            ..Default::default()
        },
    )
    .expect("Invalid fixture event")
}
