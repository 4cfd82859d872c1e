//! Ephemeral key-value cache.
//!
//! Holds the now-playing snapshot, the rendered widget, the last-seen track
//! marker and downloaded album art. Nothing stored here is a source of truth:
//! losing the whole cache only costs a few redundant writes and downloads.

mod album_art;
mod memory_cache;

pub use album_art::{album_art_cache_key, AlbumArtCache, ALBUM_ART_TTL};
pub use memory_cache::InMemoryCache;

use crate::listening::NowPlaying;
use anyhow::Result;
use std::time::Duration;

pub const NOW_PLAYING_CACHE_KEY: &str = "now_playing";
pub const NOW_PLAYING_WIDGET_CACHE_KEY: &str = "now_playing_svg";
pub const LAST_SEEN_TRACK_CACHE_KEY: &str = "last_seen_track";

pub trait EphemeralCache: Send + Sync {
    /// Store `value` under `key`. `None` means no expiry.
    fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()>;
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn delete(&self, key: &str) -> Result<()>;
    /// Remaining lifetime of `key`; `Ok(None)` if missing or without expiry.
    fn ttl(&self, key: &str) -> Result<Option<Duration>>;
}

/// Cache the now-playing data, or delete it when nothing is playing.
pub fn cache_now_playing(
    cache: &dyn EphemeralCache,
    now_playing: Option<&NowPlaying>,
    ttl: Duration,
) -> Result<()> {
    match now_playing {
        Some(data) => cache.set(NOW_PLAYING_CACHE_KEY, serde_json::to_string(data)?, Some(ttl)),
        None => cache.delete(NOW_PLAYING_CACHE_KEY),
    }
}

pub fn cache_now_playing_widget(cache: &dyn EphemeralCache, svg: String, ttl: Duration) -> Result<()> {
    cache.set(NOW_PLAYING_WIDGET_CACHE_KEY, svg, Some(ttl))
}
