use crate::cache::{EphemeralCache, LAST_SEEN_TRACK_CACHE_KEY};
use anyhow::Result;
use std::sync::Arc;
use tracing::warn;

/// The most recently observed track id, kept in the ephemeral cache.
///
/// Only used to skip redundant durable writes. The play log's unique key is
/// what actually prevents duplicate listens.
pub struct LastSeenMarker {
    cache: Arc<dyn EphemeralCache>,
}

impl LastSeenMarker {
    pub fn new(cache: Arc<dyn EphemeralCache>) -> Self {
        Self { cache }
    }

    pub fn get(&self) -> Result<Option<String>> {
        self.cache.get(LAST_SEEN_TRACK_CACHE_KEY)
    }

    pub fn set(&self, track_id: &str) -> Result<()> {
        self.cache
            .set(LAST_SEEN_TRACK_CACHE_KEY, track_id.to_string(), None)
    }

    pub fn clear(&self) -> Result<()> {
        self.cache.delete(LAST_SEEN_TRACK_CACHE_KEY)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenTransition {
    NothingPlaying,
    SameTrack,
    NewListen(String),
}

pub struct ListenStateTracker {
    marker: LastSeenMarker,
}

impl ListenStateTracker {
    pub fn new(cache: Arc<dyn EphemeralCache>) -> Self {
        Self {
            marker: LastSeenMarker::new(cache),
        }
    }

    #[cfg(test)]
    fn marker(&self) -> &LastSeenMarker {
        &self.marker
    }

    /// Advance the state machine with the track observed this cycle.
    ///
    /// Cache failures are logged and treated as an unset marker, which at
    /// worst causes a redundant (deduplicated) write.
    pub fn transition(&self, current_track_id: Option<&str>) -> ListenTransition {
        let Some(current) = current_track_id else {
            if let Err(e) = self.marker.clear() {
                warn!("Failed to clear last seen track: {:#}", e);
            }
            return ListenTransition::NothingPlaying;
        };

        let last_seen = self.marker.get().unwrap_or_else(|e| {
            warn!("Failed to read last seen track: {:#}", e);
            None
        });
        if last_seen.as_deref() == Some(current) {
            return ListenTransition::SameTrack;
        }

        if let Err(e) = self.marker.set(current) {
            warn!("Failed to store last seen track {}: {:#}", current, e);
        }
        ListenTransition::NewListen(current.to_string())
    }
}
