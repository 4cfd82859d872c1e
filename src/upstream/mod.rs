//! Upstream music service API.

mod models;
mod spotify_client;

pub use spotify_client::SpotifyClient;

use crate::listening::{Album, Artist, ListenEvent, PlaybackSnapshot};
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("No valid access token")]
    Unauthenticated,

    #[error("Rate limited by upstream (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Upstream returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Failed to decode upstream response: {0}")]
    Decode(String),

    #[error("Upstream response missing field: {0}")]
    MissingField(&'static str),
}

impl UpstreamError {
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, UpstreamError::Unauthenticated)
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            UpstreamError::Decode(err.to_string())
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}

pub type UpstreamResult<T> = std::result::Result<T, UpstreamError>;

/// Operations the ingestion engine needs from the upstream service.
///
/// Each call is one outbound request; callers account for it in the rate
/// window. `fetch_image` downloads from a CDN and is not rate accounted.
#[async_trait]
pub trait UpstreamApi: Send + Sync {
    /// `Ok(None)` when nothing is playing.
    async fn get_current_playback(&self) -> UpstreamResult<Option<PlaybackSnapshot>>;

    /// Most recent listens, newest first, at most `limit` (1..=50).
    async fn get_recently_played(&self, limit: usize) -> UpstreamResult<Vec<ListenEvent>>;

    /// One entry per requested id, `None` for unknown ids.
    async fn get_artists(&self, ids: &[String]) -> UpstreamResult<Vec<Option<Artist>>>;

    /// One entry per requested id, `None` for unknown ids.
    async fn get_albums(&self, ids: &[String]) -> UpstreamResult<Vec<Option<Album>>>;

    async fn fetch_image(&self, url: &str) -> UpstreamResult<Vec<u8>>;
}
