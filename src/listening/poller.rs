//! The live playback poller.
//!
//! One cycle fetches the current playback, refreshes the now-playing cache,
//! advances the listen state machine and, on a new listen, writes the track
//! and the play log row. The poll job is a self-rescheduling chain: every
//! cycle ends by scheduling the next one, whatever happened during it.

use super::metadata_sync::MetadataSyncer;
use super::models::{PlayLogEntry, PlaybackSnapshot};
use super::state_tracker::{ListenStateTracker, ListenTransition};
use super::widget::render_now_playing_svg;
use super::ListeningDeps;
use crate::background_jobs::SelfReschedulingTimer;
use crate::cache::{cache_now_playing, cache_now_playing_widget, AlbumArtCache, NOW_PLAYING_WIDGET_CACHE_KEY};
use crate::listen_store::PlayInsert;
use crate::rate_limit::AdaptiveRateLimiter;
use crate::upstream::UpstreamError;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// How the delay before the next live poll is chosen.
///
/// Every policy is non-decreasing in the number of requests a cycle made and
/// the result is always kept within the limiter's `[min_interval, max_interval]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollIntervalPolicy {
    /// Follow the rate limiter's usage tiers.
    Adaptive,
    /// `single` after a one-request cycle, `multiple` when metadata was fetched too.
    RequestVolume { single: Duration, multiple: Duration },
    Fixed(Duration),
}

impl PollIntervalPolicy {
    pub fn next_interval(&self, requests_made: usize, limiter: &AdaptiveRateLimiter) -> Duration {
        let interval = match (self, requests_made) {
            // Nothing was fetched (no credentials): retry soon.
            (_, 0) => limiter.min_interval(),
            (PollIntervalPolicy::Adaptive, _) => limiter.next_interval(),
            (PollIntervalPolicy::RequestVolume { single, .. }, 1) => *single,
            (PollIntervalPolicy::RequestVolume { multiple, .. }, _) => *multiple,
            (PollIntervalPolicy::Fixed(interval), _) => *interval,
        };
        interval
            .max(limiter.min_interval())
            .min(limiter.max_interval())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollStatus {
    Ok,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Unauthenticated,
    UpstreamFailure,
    RateLimited,
}

impl From<&UpstreamError> for SkipReason {
    fn from(err: &UpstreamError) -> Self {
        match err {
            UpstreamError::Unauthenticated => SkipReason::Unauthenticated,
            UpstreamError::RateLimited { .. } => SkipReason::RateLimited,
            _ => SkipReason::UpstreamFailure,
        }
    }
}

/// Result of one live poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackPollOutcome {
    pub status: PollStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<SkipReason>,
    pub playing: bool,
    pub new_listen: bool,
    pub requests_made: usize,
    pub next_interval_secs: u64,
}

impl PlaybackPollOutcome {
    fn skipped(reason: SkipReason, requests_made: usize) -> Self {
        Self {
            status: PollStatus::Skipped,
            reason: Some(reason),
            playing: false,
            new_listen: false,
            requests_made,
            next_interval_secs: 0,
        }
    }

    fn ok(playing: bool, new_listen: bool, requests_made: usize) -> Self {
        Self {
            status: PollStatus::Ok,
            reason: None,
            playing,
            new_listen,
            requests_made,
            next_interval_secs: 0,
        }
    }
}

pub struct PlaybackPoller {
    deps: ListeningDeps,
    tracker: ListenStateTracker,
    syncer: Arc<MetadataSyncer>,
    album_art: AlbumArtCache,
    policy: PollIntervalPolicy,
    timer: Option<SelfReschedulingTimer>,
    /// Held for a whole cycle; transitions are not reentrant.
    cycle_lock: Mutex<()>,
}

impl PlaybackPoller {
    pub fn new(deps: ListeningDeps, syncer: Arc<MetadataSyncer>, policy: PollIntervalPolicy) -> Self {
        Self {
            tracker: ListenStateTracker::new(Arc::clone(&deps.cache)),
            album_art: AlbumArtCache::new(Arc::clone(&deps.cache), Arc::clone(&deps.upstream)),
            deps,
            syncer,
            policy,
            timer: None,
            cycle_lock: Mutex::new(()),
        }
    }

    /// Reschedule through `timer` at the end of every cycle.
    pub fn with_timer(mut self, timer: SelfReschedulingTimer) -> Self {
        self.timer = Some(timer);
        self
    }

    /// Run one poll cycle and schedule the next one.
    ///
    /// Never fails: upstream and store errors degrade to a skipped or partial
    /// outcome plus a log record.
    pub async fn poll_current_playback(&self) -> PlaybackPollOutcome {
        let _cycle = self.cycle_lock.lock().await;

        let mut outcome = self.run_cycle().await;
        let next_interval = self
            .policy
            .next_interval(outcome.requests_made, &self.deps.rate_limiter);
        outcome.next_interval_secs = next_interval.as_secs();

        debug!(
            "Playback poll: {:?} playing={} new_listen={} requests={} stats={:?}",
            outcome.status,
            outcome.playing,
            outcome.new_listen,
            outcome.requests_made,
            self.deps.rate_limiter.stats()
        );

        if let Some(timer) = &self.timer {
            timer.reschedule(next_interval).await;
        }
        outcome
    }

    async fn run_cycle(&self) -> PlaybackPollOutcome {
        if !self.deps.has_credentials() {
            return PlaybackPollOutcome::skipped(SkipReason::Unauthenticated, 0);
        }

        let fetched = self.deps.upstream.get_current_playback().await;
        self.deps.rate_limiter.record(1);
        let mut requests_made = 1;

        let snapshot = match fetched {
            Ok(snapshot) => snapshot,
            Err(e) => {
                if e.is_unauthenticated() {
                    info!("Playback poll skipped: {}", e);
                } else {
                    warn!("Failed to fetch current playback: {}", e);
                }
                return PlaybackPollOutcome::skipped(SkipReason::from(&e), requests_made);
            }
        };

        let Some(snapshot) = snapshot else {
            self.clear_now_playing();
            self.tracker.transition(None);
            return PlaybackPollOutcome::ok(false, false, requests_made);
        };

        self.cache_snapshot(&snapshot).await;

        let new_listen = match self.tracker.transition(Some(&snapshot.track.track_id)) {
            ListenTransition::NewListen(track_id) => {
                info!("New listen: {} - {}", track_id, snapshot.track.name);
                requests_made += self.record_listen(&snapshot).await;
                true
            }
            ListenTransition::SameTrack | ListenTransition::NothingPlaying => false,
        };

        PlaybackPollOutcome::ok(snapshot.is_playing, new_listen, requests_made)
    }

    fn clear_now_playing(&self) {
        let cache = self.deps.cache.as_ref();
        if let Err(e) = cache_now_playing(cache, None, Duration::ZERO) {
            warn!("Failed to clear now playing cache: {:#}", e);
        }
        if let Err(e) = cache.delete(NOW_PLAYING_WIDGET_CACHE_KEY) {
            warn!("Failed to clear now playing widget: {:#}", e);
        }
    }

    async fn cache_snapshot(&self, snapshot: &PlaybackSnapshot) {
        let ttl = snapshot.cache_ttl();
        let now_playing = snapshot.now_playing();
        let cache = self.deps.cache.as_ref();

        if let Err(e) = cache_now_playing(cache, Some(&now_playing), ttl) {
            warn!("Failed to cache now playing: {:#}", e);
        }

        let album_art = match &now_playing.album_art {
            Some(url) => self.album_art.ensure_cached(url).await,
            None => None,
        };
        let svg = render_now_playing_svg(&now_playing, album_art.as_deref());
        if let Err(e) = cache_now_playing_widget(cache, svg, ttl) {
            warn!("Failed to cache now playing widget: {:#}", e);
        }
    }

    /// Durable writes for a new listen. Returns the metadata requests made.
    ///
    /// `listen_count` only grows when the play log row is actually inserted,
    /// so a replayed listen (lost marker, backstop got there first) is a no-op
    /// for the counter.
    async fn record_listen(&self, snapshot: &PlaybackSnapshot) -> usize {
        let store = self.deps.store.as_ref();
        let track = &snapshot.track;

        let inserted = match PlayLogEntry::from_snapshot(snapshot) {
            Ok(entry) => match store.insert_play(&entry) {
                Ok(PlayInsert::Inserted) => {
                    debug!("Logged play of {} at {}", entry.track_id, entry.listened_at);
                    true
                }
                Ok(PlayInsert::Duplicate) => {
                    debug!(
                        "Play of {} at {} already logged",
                        entry.track_id, entry.listened_at
                    );
                    false
                }
                Err(e) => {
                    error!("Failed to log play of {}: {:#}", entry.track_id, e);
                    false
                }
            },
            Err(e) => {
                warn!("Invalid play log entry for {}: {}", track.track_id, e);
                false
            }
        };

        let created = match store.upsert_track(track, snapshot.started_at(), inserted) {
            Ok(upsert) => upsert.was_created(),
            Err(e) => {
                error!("Failed to store track {}: {:#}", track.track_id, e);
                false
            }
        };

        if !created {
            return 0;
        }
        let report = self.syncer.sync_track(track).await;
        if report.artists_synced > 0 || report.albums_synced > 0 {
            info!(
                "Synced {} artists and {} albums for new track {}",
                report.artists_synced, report.albums_synced, track.track_id
            );
        }
        report.requests_made
    }
}
