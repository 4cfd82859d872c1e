use chrono::{DateTime, Duration as ChronoDuration, DurationRound, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Seconds added to the remaining track time when caching a snapshot.
pub const SNAPSHOT_TTL_BUFFER_SECS: i64 = 30;

/// Snapshot cache entries never live shorter than this.
pub const SNAPSHOT_TTL_FLOOR_SECS: i64 = 60;

/// Errors raised when building a value type from incomplete data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

// =============================================================================
// Tracks
// =============================================================================

/// Track metadata as reported by the upstream API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub track_id: String,
    pub name: String,
    pub artists: Vec<String>,
    pub artist_ids: Vec<String>,
    pub album: String,
    pub album_id: Option<String>,
    pub album_art: Option<String>,
    pub duration_ms: i64,
    pub explicit: Option<bool>,
    pub popularity: Option<i64>,
    pub disc_number: Option<i64>,
    pub track_number: Option<i64>,
    pub isrc: Option<String>,
}

impl TrackMetadata {
    /// Check the fields every stored track must have.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.track_id.trim().is_empty() {
            return Err(ModelError::MissingField("track_id"));
        }
        if self.name.is_empty() {
            return Err(ModelError::MissingField("name"));
        }
        if self.duration_ms < 0 {
            return Err(ModelError::InvalidValue {
                field: "duration_ms",
                reason: format!("negative duration {}", self.duration_ms),
            });
        }
        if self.artists.len() != self.artist_ids.len() {
            return Err(ModelError::InvalidValue {
                field: "artist_ids",
                reason: format!(
                    "{} artist names but {} artist ids",
                    self.artists.len(),
                    self.artist_ids.len()
                ),
            });
        }
        Ok(())
    }

    /// Artist names joined for display.
    pub fn artist_line(&self) -> String {
        self.artists.join(", ")
    }
}

/// A stored track with its listening counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackRecord {
    pub metadata: TrackMetadata,
    pub listen_count: i64,
    pub first_listened: DateTime<Utc>,
    pub last_listened: DateTime<Utc>,
}

// =============================================================================
// Playback
// =============================================================================

/// Where and how a track was being played.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackContext {
    pub device_name: Option<String>,
    pub device_type: Option<String>,
    pub context_type: Option<String>,
    pub context_uri: Option<String>,
    pub shuffle_state: Option<bool>,
}

/// What is playing upstream right now.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSnapshot {
    pub track: TrackMetadata,
    pub is_playing: bool,
    pub progress_ms: i64,
    pub url: Option<String>,
    pub context: PlaybackContext,
    pub observed_at: DateTime<Utc>,
}

impl PlaybackSnapshot {
    pub fn new(
        track: TrackMetadata,
        is_playing: bool,
        progress_ms: i64,
        url: Option<String>,
        context: PlaybackContext,
        observed_at: DateTime<Utc>,
    ) -> Result<Self, ModelError> {
        track.validate()?;
        if progress_ms < 0 {
            return Err(ModelError::InvalidValue {
                field: "progress_ms",
                reason: format!("negative progress {}", progress_ms),
            });
        }
        Ok(Self {
            track,
            is_playing,
            progress_ms,
            url,
            context,
            observed_at,
        })
    }

    pub fn remaining_ms(&self) -> i64 {
        self.track.duration_ms - self.progress_ms
    }

    /// How long the now-playing cache entry should live.
    pub fn cache_ttl(&self) -> Duration {
        snapshot_ttl(self.remaining_ms())
    }

    /// When the current listen started: observation time minus progress.
    ///
    /// The play log keys live listens on this start time and recently played
    /// listens on `ListenEvent::played_at`. Both are treated as the same
    /// instant once rounded to the minute, which is what lets the two sources
    /// collapse into one row. Upstream reports `played_at` closer to the end
    /// of a listen, so long tracks can land in different minutes; changing
    /// either side alone breaks deduplication.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.observed_at - ChronoDuration::milliseconds(self.progress_ms)
    }

    pub fn now_playing(&self) -> NowPlaying {
        NowPlaying {
            is_playing: self.is_playing,
            track_id: self.track.track_id.clone(),
            title: self.track.name.clone(),
            artist: self.track.artist_line(),
            album: self.track.album.clone(),
            album_art: self.track.album_art.clone(),
            url: self.url.clone(),
            progress_ms: self.progress_ms,
            duration_ms: self.track.duration_ms,
        }
    }
}

/// `max(remaining_secs + 30, 60)`, with remaining seconds floored.
pub fn snapshot_ttl(remaining_ms: i64) -> Duration {
    let remaining_secs = remaining_ms.div_euclid(1000);
    let ttl = (remaining_secs + SNAPSHOT_TTL_BUFFER_SECS).max(SNAPSHOT_TTL_FLOOR_SECS);
    Duration::from_secs(ttl as u64)
}

/// Presentation form of a snapshot, as stored in the ephemeral cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NowPlaying {
    pub is_playing: bool,
    pub track_id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub album_art: Option<String>,
    pub url: Option<String>,
    pub progress_ms: i64,
    pub duration_ms: i64,
}

/// A completed listen reported by the recently-played endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ListenEvent {
    pub track: TrackMetadata,
    /// Assumed to align with `PlaybackSnapshot::started_at` at minute
    /// resolution. See there before adjusting it.
    pub played_at: DateTime<Utc>,
    pub context: PlaybackContext,
}

impl ListenEvent {
    pub fn new(
        track: TrackMetadata,
        played_at: DateTime<Utc>,
        context: PlaybackContext,
    ) -> Result<Self, ModelError> {
        track.validate()?;
        Ok(Self {
            track,
            played_at,
            context,
        })
    }
}

// =============================================================================
// Play log
// =============================================================================

/// One row of the play log.
///
/// `(track_id, listened_at)` is the deduplication key. `listened_at` is always
/// truncated to the minute so the live poller and the backstop poller, which
/// observe the same listen with different precision, produce the same key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayLogEntry {
    pub track_id: String,
    pub listened_at: DateTime<Utc>,
    pub context: PlaybackContext,
}

impl PlayLogEntry {
    pub fn new(
        track_id: impl Into<String>,
        listened_at: DateTime<Utc>,
        context: PlaybackContext,
    ) -> Result<Self, ModelError> {
        let track_id = track_id.into();
        if track_id.trim().is_empty() {
            return Err(ModelError::MissingField("track_id"));
        }
        Ok(Self {
            track_id,
            listened_at: round_to_minute(listened_at),
            context,
        })
    }

    pub fn from_snapshot(snapshot: &PlaybackSnapshot) -> Result<Self, ModelError> {
        Self::new(
            snapshot.track.track_id.clone(),
            snapshot.started_at(),
            snapshot.context.clone(),
        )
    }

    pub fn from_event(event: &ListenEvent) -> Result<Self, ModelError> {
        Self::new(
            event.track.track_id.clone(),
            event.played_at,
            event.context.clone(),
        )
    }
}

/// Truncate to the start of the minute.
pub fn round_to_minute(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(ChronoDuration::minutes(1)).unwrap_or(at)
}

// =============================================================================
// Reference data
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub artist_id: String,
    pub name: String,
    pub genres: Vec<String>,
    pub popularity: Option<i64>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub album_id: String,
    pub name: String,
    pub album_type: Option<String>,
    pub total_tracks: Option<i64>,
    pub release_date: Option<String>,
    pub release_date_precision: Option<String>,
    pub label: Option<String>,
    pub popularity: Option<i64>,
    pub image: Option<String>,
    pub artist_ids: Vec<String>,
}
