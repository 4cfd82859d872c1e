//! Durable listening history: tracks, the play log and artist/album reference data.

mod schema;
mod sqlite_listen_store;

pub use schema::LISTEN_VERSIONED_SCHEMAS;
pub use sqlite_listen_store::SqliteListenStore;

use crate::listening::{Album, Artist, PlayLogEntry, TrackMetadata, TrackRecord};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;

/// Whether a track upsert inserted a new row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackUpsert {
    Created,
    Updated,
}

impl TrackUpsert {
    pub fn was_created(self) -> bool {
        self == TrackUpsert::Created
    }
}

/// Outcome of a play log insert. `Duplicate` is an expected result, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayInsert {
    Inserted,
    Duplicate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListenStoreStats {
    pub tracks: usize,
    pub plays: usize,
    pub artists: usize,
    pub albums: usize,
}

pub trait ListenStore: Send + Sync {
    /// Insert or update a track.
    ///
    /// Metadata is always overwritten. `listen_count` grows by one only when
    /// `increment` is set; a new track starts at 1 or 0 accordingly.
    /// `first_listened`/`last_listened` widen to include `listened_at`.
    fn upsert_track(
        &self,
        track: &TrackMetadata,
        listened_at: DateTime<Utc>,
        increment: bool,
    ) -> Result<TrackUpsert>;

    /// Insert a play log row unless `(track_id, listened_at)` already exists.
    ///
    /// On a duplicate, context fields still NULL on the stored row are filled
    /// from `entry`.
    fn insert_play(&self, entry: &PlayLogEntry) -> Result<PlayInsert>;

    fn get_track(&self, track_id: &str) -> Result<Option<TrackRecord>>;

    fn count_plays_for_track(&self, track_id: &str) -> Result<usize>;

    fn get_plays_for_track(&self, track_id: &str) -> Result<Vec<PlayLogEntry>>;

    /// Insert artists not already stored. Returns how many rows were added.
    fn insert_artists(&self, artists: &[Artist]) -> Result<usize>;

    /// Insert albums not already stored. Returns how many rows were added.
    fn insert_albums(&self, albums: &[Album]) -> Result<usize>;

    /// The subset of `ids` already present in the artists table.
    fn existing_artist_ids(&self, ids: &[String]) -> Result<HashSet<String>>;

    /// The subset of `ids` already present in the albums table.
    fn existing_album_ids(&self, ids: &[String]) -> Result<HashSet<String>>;

    /// Every artist id referenced by a stored track.
    fn referenced_artist_ids(&self) -> Result<HashSet<String>>;

    /// Every album id referenced by a stored track.
    fn referenced_album_ids(&self) -> Result<HashSet<String>>;

    fn get_stats(&self) -> Result<ListenStoreStats>;
}
