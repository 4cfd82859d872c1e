use super::EphemeralCache;
use crate::upstream::UpstreamApi;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const ALBUM_ART_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const ALBUM_ART_KEY_PREFIX: &str = "album_art:";
const ALBUM_ART_KEY_HASH_CHARS: usize = 16;

/// Cache key for an album art URL: `album_art:` plus a short sha256 hex prefix.
pub fn album_art_cache_key(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}{}", ALBUM_ART_KEY_PREFIX, &hex[..ALBUM_ART_KEY_HASH_CHARS])
}

/// Keeps base64 copies of album art in the ephemeral cache so the widget can
/// embed them without downloading on every render.
pub struct AlbumArtCache {
    cache: Arc<dyn EphemeralCache>,
    upstream: Arc<dyn UpstreamApi>,
}

impl AlbumArtCache {
    pub fn new(cache: Arc<dyn EphemeralCache>, upstream: Arc<dyn UpstreamApi>) -> Self {
        Self { cache, upstream }
    }

    /// Return the cached base64 image, downloading it first if needed.
    ///
    /// Any failure yields `None`; the caller renders without the image.
    pub async fn ensure_cached(&self, url: &str) -> Option<String> {
        let key = album_art_cache_key(url);
        match self.cache.get(&key) {
            Ok(Some(encoded)) => return Some(encoded),
            Ok(None) => {}
            Err(e) => warn!("Failed to read album art cache for {}: {}", key, e),
        }

        let bytes = match self.upstream.fetch_image(url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to download album art {}: {}", url, e);
                return None;
            }
        };
        let encoded = BASE64.encode(&bytes);
        debug!("Cached album art {} ({} bytes)", key, bytes.len());
        if let Err(e) = self.cache.set(&key, encoded.clone(), Some(ALBUM_ART_TTL)) {
            warn!("Failed to store album art {}: {}", key, e);
        }
        Some(encoded)
    }
}
