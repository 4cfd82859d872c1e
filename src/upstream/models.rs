//! Wire shapes of the Spotify Web API and their conversion into domain types.

use super::UpstreamError;
use crate::credentials::AccessToken;
use crate::listening::{
    Album, Artist, ListenEvent, PlaybackContext, PlaybackSnapshot, TrackMetadata,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(super) struct WireImage {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireArtistRef {
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireAlbumRef {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub images: Vec<WireImage>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct WireExternalIds {
    pub isrc: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct WireExternalUrls {
    pub spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireTrack {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<WireArtistRef>,
    pub album: WireAlbumRef,
    pub duration_ms: i64,
    pub explicit: Option<bool>,
    pub popularity: Option<i64>,
    pub disc_number: Option<i64>,
    pub track_number: Option<i64>,
    #[serde(default)]
    pub external_ids: WireExternalIds,
    #[serde(default)]
    pub external_urls: WireExternalUrls,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireDevice {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub device_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireContext {
    #[serde(rename = "type")]
    pub context_type: Option<String>,
    pub uri: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct WirePlayback {
    pub device: Option<WireDevice>,
    pub shuffle_state: Option<bool>,
    pub context: Option<WireContext>,
    pub progress_ms: Option<i64>,
    #[serde(default)]
    pub is_playing: bool,
    pub item: Option<WireTrack>,
}

#[derive(Debug, Deserialize)]
pub(super) struct WirePlayHistory {
    pub track: WireTrack,
    pub played_at: DateTime<Utc>,
    pub context: Option<WireContext>,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireRecentlyPlayed {
    #[serde(default)]
    pub items: Vec<WirePlayHistory>,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireArtist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    pub popularity: Option<i64>,
    #[serde(default)]
    pub images: Vec<WireImage>,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireArtists {
    pub artists: Vec<Option<WireArtist>>,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireAlbum {
    pub id: String,
    pub name: String,
    pub album_type: Option<String>,
    pub total_tracks: Option<i64>,
    pub release_date: Option<String>,
    pub release_date_precision: Option<String>,
    pub label: Option<String>,
    pub popularity: Option<i64>,
    #[serde(default)]
    pub images: Vec<WireImage>,
    #[serde(default)]
    pub artists: Vec<WireArtistRef>,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireAlbums {
    pub albums: Vec<Option<WireAlbum>>,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireTokenResponse {
    pub access_token: String,
    pub expires_in: Option<i64>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct WireErrorBody {
    pub error: Option<WireErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireErrorDetail {
    pub message: Option<String>,
}

fn first_image(images: Vec<WireImage>) -> Option<String> {
    images.into_iter().next().map(|image| image.url)
}

impl From<Option<WireContext>> for PlaybackContext {
    fn from(context: Option<WireContext>) -> Self {
        let (context_type, context_uri) = match context {
            Some(c) => (c.context_type, c.uri),
            None => (None, None),
        };
        PlaybackContext {
            context_type,
            context_uri,
            ..Default::default()
        }
    }
}

impl WireTrack {
    /// Convert into domain metadata plus the track's web URL.
    ///
    /// Artists without an id (local files) are dropped.
    pub fn into_metadata(self) -> Result<(TrackMetadata, Option<String>), UpstreamError> {
        let track_id = self
            .id
            .filter(|id| !id.is_empty())
            .ok_or(UpstreamError::MissingField("track.id"))?;

        let (artists, artist_ids): (Vec<String>, Vec<String>) = self
            .artists
            .into_iter()
            .filter_map(|a| a.id.map(|id| (a.name, id)))
            .unzip();

        let metadata = TrackMetadata {
            track_id,
            name: self.name,
            artists,
            artist_ids,
            album: self.album.name,
            album_id: self.album.id,
            album_art: first_image(self.album.images),
            duration_ms: self.duration_ms,
            explicit: self.explicit,
            popularity: self.popularity,
            disc_number: self.disc_number,
            track_number: self.track_number,
            isrc: self.external_ids.isrc,
        };
        metadata
            .validate()
            .map_err(|e| UpstreamError::Decode(e.to_string()))?;
        Ok((metadata, self.external_urls.spotify))
    }
}

impl WirePlayback {
    pub fn into_snapshot(
        self,
        observed_at: DateTime<Utc>,
    ) -> Result<Option<PlaybackSnapshot>, UpstreamError> {
        let Some(item) = self.item else {
            return Ok(None);
        };
        let (track, url) = item.into_metadata()?;

        let mut context = PlaybackContext::from(self.context);
        if let Some(device) = self.device {
            context.device_name = device.name;
            context.device_type = device.device_type;
        }
        context.shuffle_state = self.shuffle_state;

        PlaybackSnapshot::new(
            track,
            self.is_playing,
            self.progress_ms.unwrap_or(0).max(0),
            url,
            context,
            observed_at,
        )
        .map(Some)
        .map_err(|e| UpstreamError::Decode(e.to_string()))
    }
}

impl WirePlayHistory {
    pub fn into_event(self) -> Result<ListenEvent, UpstreamError> {
        let (track, _url) = self.track.into_metadata()?;
        ListenEvent::new(track, self.played_at, PlaybackContext::from(self.context))
            .map_err(|e| UpstreamError::Decode(e.to_string()))
    }
}

impl From<WireArtist> for Artist {
    fn from(artist: WireArtist) -> Self {
        Artist {
            artist_id: artist.id,
            name: artist.name,
            genres: artist.genres,
            popularity: artist.popularity,
            image: first_image(artist.images),
        }
    }
}

impl From<WireAlbum> for Album {
    fn from(album: WireAlbum) -> Self {
        Album {
            album_id: album.id,
            name: album.name,
            album_type: album.album_type,
            total_tracks: album.total_tracks,
            release_date: album.release_date,
            release_date_precision: album.release_date_precision,
            label: album.label,
            popularity: album.popularity,
            image: first_image(album.images),
            artist_ids: album.artists.into_iter().filter_map(|a| a.id).collect(),
        }
    }
}

impl WireTokenResponse {
    /// Build the stored token. Spotify omits the refresh token on refresh
    /// when it did not rotate it, so the previous one is carried over.
    pub fn into_token(self, now_unix: i64, previous_refresh: Option<String>) -> AccessToken {
        AccessToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at: self.expires_in.map(|secs| now_unix + secs),
            scope: self.scope,
        }
    }
}
