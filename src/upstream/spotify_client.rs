//! HTTP client for the Spotify Web API.

use super::models::{
    WireAlbums, WireArtists, WireErrorBody, WirePlayback, WireRecentlyPlayed, WireTokenResponse,
};
use super::{UpstreamApi, UpstreamError, UpstreamResult};
use crate::config::UpstreamSettings;
use crate::credentials::{AccessToken, CredentialStore};
use crate::listening::{Album, Artist, ListenEvent, PlaybackSnapshot};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct SpotifyClient {
    http: reqwest::Client,
    api_base_url: String,
    accounts_url: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    credentials: Arc<dyn CredentialStore>,
    // Held across a refresh so concurrent callers don't refresh twice.
    refresh_lock: tokio::sync::Mutex<()>,
}

impl SpotifyClient {
    pub fn new(settings: &UpstreamSettings, credentials: Arc<dyn CredentialStore>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            api_base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            accounts_url: settings.accounts_url.clone(),
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            credentials,
            refresh_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn cached_token(&self) -> UpstreamResult<Option<AccessToken>> {
        self.credentials.get_cached_token().map_err(|e| {
            warn!("Failed to read cached token: {:#}", e);
            UpstreamError::Unauthenticated
        })
    }

    /// A usable bearer token, refreshing an expired one when possible.
    async fn access_token(&self) -> UpstreamResult<String> {
        let token = self.cached_token()?.ok_or(UpstreamError::Unauthenticated)?;
        if !token.is_expired() {
            return Ok(token.access_token);
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited.
        let token = self.cached_token()?.ok_or(UpstreamError::Unauthenticated)?;
        if !token.is_expired() {
            return Ok(token.access_token);
        }
        let refreshed = self.refresh(&token).await?;
        Ok(refreshed.access_token)
    }

    async fn refresh(&self, token: &AccessToken) -> UpstreamResult<AccessToken> {
        let (Some(refresh_token), Some(client_id), Some(client_secret)) = (
            token.refresh_token.as_deref(),
            self.client_id.as_deref(),
            self.client_secret.as_deref(),
        ) else {
            debug!("Token expired and cannot be refreshed");
            return Err(UpstreamError::Unauthenticated);
        };

        let response = self
            .http
            .post(&self.accounts_url)
            .basic_auth(client_id, Some(client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            warn!("Token refresh failed with status {}", status);
            if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
                return Err(UpstreamError::Unauthenticated);
            }
            return Err(error_from_response(response).await);
        }

        let body: WireTokenResponse = response.json().await?;
        let refreshed = body.into_token(Utc::now().timestamp(), token.refresh_token.clone());
        if let Err(e) = self.credentials.save_token(&refreshed) {
            warn!("Failed to persist refreshed token: {:#}", e);
        }
        info!("Refreshed upstream access token");
        Ok(refreshed)
    }

    /// GET an API path. `Ok(None)` for 204 No Content.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> UpstreamResult<Option<T>> {
        let token = self.access_token().await?;
        let url = format!("{}{}", self.api_base_url, path);
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(None),
            status if status.is_success() => {
                let bytes = response.bytes().await?;
                if bytes.is_empty() {
                    return Ok(None);
                }
                serde_json::from_slice(&bytes)
                    .map(Some)
                    .map_err(|e| UpstreamError::Decode(format!("{}: {}", path, e)))
            }
            _ => Err(error_from_response(response).await),
        }
    }
}

async fn error_from_response(response: Response) -> UpstreamError {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return UpstreamError::Unauthenticated;
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return UpstreamError::RateLimited { retry_after };
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<WireErrorBody>(&body)
        .ok()
        .and_then(|b| b.error)
        .and_then(|e| e.message)
        .unwrap_or(body);
    UpstreamError::Status {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl UpstreamApi for SpotifyClient {
    async fn get_current_playback(&self) -> UpstreamResult<Option<PlaybackSnapshot>> {
        let playback: Option<WirePlayback> = self.get_json("/me/player", &[]).await?;
        match playback {
            Some(playback) => playback.into_snapshot(Utc::now()),
            None => Ok(None),
        }
    }

    async fn get_recently_played(&self, limit: usize) -> UpstreamResult<Vec<ListenEvent>> {
        let limit = limit.clamp(1, 50);
        let recent: Option<WireRecentlyPlayed> = self
            .get_json("/me/player/recently-played", &[("limit", limit.to_string())])
            .await?;

        let mut events = Vec::new();
        for item in recent.map(|r| r.items).unwrap_or_default() {
            match item.into_event() {
                Ok(event) => events.push(event),
                Err(e) => warn!("Skipping recently played item: {}", e),
            }
        }
        Ok(events)
    }

    async fn get_artists(&self, ids: &[String]) -> UpstreamResult<Vec<Option<Artist>>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let body: Option<WireArtists> = self.get_json("/artists", &[("ids", ids.join(","))]).await?;
        let body = body.ok_or(UpstreamError::MissingField("artists"))?;
        Ok(body
            .artists
            .into_iter()
            .map(|artist| artist.map(Artist::from))
            .collect())
    }

    async fn get_albums(&self, ids: &[String]) -> UpstreamResult<Vec<Option<Album>>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let body: Option<WireAlbums> = self.get_json("/albums", &[("ids", ids.join(","))]).await?;
        let body = body.ok_or(UpstreamError::MissingField("albums"))?;
        Ok(body
            .albums
            .into_iter()
            .map(|album| album.map(Album::from))
            .collect())
    }

    async fn fetch_image(&self, url: &str) -> UpstreamResult<Vec<u8>> {
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(UpstreamError::Status {
                status: response.status().as_u16(),
                message: format!("image download failed for {}", url),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}
